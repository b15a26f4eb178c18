//! Supervises external commands (Helm, `kubectl`, and friends) with captured
//! stdio and no leaked zombies.
//!
//! Kubernetes/Helm interaction in this codebase happens *only* through this
//! module: nothing upstream embeds a Kubernetes client library, so upgrading
//! `helm`/`kubectl` on the host never requires a rebuild.
//!
//! Two flavors are exposed, matching the two places callers run from:
//!
//! - [`run`] is async, built on `tokio::process::Command`. Use it from
//!   request handlers, where the child's wait interleaves with other work on
//!   the same worker pool. Tokio's process driver is itself the "signal
//!   driven reaper": it installs one process-wide `SIGCHLD` handler and wakes
//!   the matching `Child::wait` future when it fires, which is exactly the
//!   single-reaper-thread design this module is modeling in safe Rust.
//! - [`run_blocking`] is synchronous, built on `std::process::Command`. Use
//!   it from contexts that must not assume a Tokio runtime is present.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Resolves `exe` against `$PATH` when it has no path separator, mirroring
/// what `execvp` does. Mostly useful so a missing `helm`/`kubectl` binary is
/// reported up front instead of surfacing as an opaque `ENOENT` from exec.
pub fn resolve_exe(exe: &str) -> Result<PathBuf> {
    if exe.contains('/') {
        let path = PathBuf::from(exe);
        if path.is_file() {
            return Ok(path);
        }
        bail!("executable not found: {}", exe);
    }
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(exe);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    bail!("'{}' not found on PATH", exe);
}

/// Output of a completed child process.
#[derive(Debug, Clone)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    /// Normal exit decodes to the process's exit code; a process killed by a
    /// signal decodes to 255, matching the reference's `WIFSIGNALED` path.
    pub exit_status: i32,
}

impl Output {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// First line in stderr (falling back to stdout) containing the literal
    /// word "Error", used to build concise upstream-failure messages.
    pub fn first_error_line(&self) -> Option<&str> {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .find(|l| l.contains("Error"))
    }
}

fn decode_exit_status(status: std::process::ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 255, // terminated by signal
    }
}

fn build_env<I, K, V>(overlay: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let mut env: HashMap<String, String> = std::env::vars().collect();
    for (k, v) in overlay {
        env.insert(
            k.as_ref().to_string_lossy().into_owned(),
            v.as_ref().to_string_lossy().into_owned(),
        );
    }
    env
}

/// Runs `exe argv[..]` to completion, draining stdout/stderr and optionally
/// writing `stdin` first. This is the async flavor; use from request
/// handlers and other Tokio contexts.
pub async fn run<I, K, V>(exe: &str, argv: &[String], env: I, stdin: Option<&[u8]>) -> Result<Output>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let resolved = resolve_exe(exe)?;
    let env = build_env(env);
    tracing::debug!(exe = %resolved.display(), argv = ?argv, "spawning supervised process");

    let mut cmd = tokio::process::Command::new(&resolved);
    cmd.args(argv)
        .env_clear()
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn '{}'", exe))?;

    if let Some(body) = stdin {
        let mut writer = child.stdin.take().expect("stdin was piped");
        writer
            .write_all(body)
            .await
            .context("failed to write to child stdin")?;
        drop(writer); // close stdin so the child sees EOF
    } else {
        drop(child.stdin.take());
    }

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)
            .await
            .context("failed to read child stdout")?;
    }
    if let Some(mut err) = child.stderr.take() {
        err.read_to_string(&mut stderr)
            .await
            .context("failed to read child stderr")?;
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to wait on '{}'", exe))?;

    Ok(Output {
        stdout,
        stderr,
        exit_status: decode_exit_status(status),
    })
}

/// Synchronous flavor of [`run`], for contexts without a Tokio runtime.
pub fn run_blocking<I, K, V>(exe: &str, argv: &[String], env: I) -> Result<Output>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let resolved = resolve_exe(exe)?;
    let env = build_env(env);

    let mut cmd = std::process::Command::new(&resolved);
    cmd.args(argv)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .with_context(|| format!("failed to run '{}'", exe))?;

    Ok(Output {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_status: decode_exit_status(output.status),
    })
}

/// A long-running, detached process started without captured stdio (stdio is
/// redirected to `/dev/null`). Dropping the handle does *not* signal the
/// child — use this only for processes this service intentionally leaves
/// running past the request that started them.
pub struct DetachedHandle {
    child: tokio::process::Child,
}

impl DetachedHandle {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await.context("failed to wait on child")?;
        Ok(decode_exit_status(status))
    }
}

pub async fn spawn_detached<I, K, V>(exe: &str, argv: &[String], env: I) -> Result<DetachedHandle>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let resolved = resolve_exe(exe)?;
    let env = build_env(env);
    let mut cmd = tokio::process::Command::new(&resolved);
    cmd.args(argv)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false);
    let child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn detached '{}'", exe))?;
    println!(
        "{} {}",
        "🚀 Spawned detached process".green(),
        format!("pid={:?}", child.id()).green().dimmed()
    );
    Ok(DetachedHandle { child })
}

/// Runs `exe` with a timeout, killing it if it overruns. Timeouts are the
/// caller's responsibility per the supervisor's contract; this is the
/// standard way a caller exercises that responsibility.
pub async fn run_with_timeout<I, K, V>(
    exe: &str,
    argv: &[String],
    env: I,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<Output>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    match tokio::time::timeout(timeout, run(exe, argv, env, stdin)).await {
        Ok(result) => result,
        Err(_) => bail!("'{}' timed out after {:?}", exe, timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout_and_exit_code() {
        let out = run::<_, &str, &str>("true", &[], [], None).await.unwrap();
        assert!(out.success());
        assert_eq!(out.exit_status, 0);
    }

    #[tokio::test]
    async fn run_reports_nonzero_exit() {
        let out = run::<_, &str, &str>("false", &[], [], None).await.unwrap();
        assert!(!out.success());
    }

    #[tokio::test]
    async fn run_pipes_stdin_to_cat() {
        let out = run::<_, &str, &str>("cat", &[], [], Some(b"hello\n"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
    }

    #[test]
    fn resolve_exe_rejects_missing_binary() {
        assert!(resolve_exe("definitely-not-a-real-binary-xyz").is_err());
    }

    #[test]
    fn first_error_line_finds_error_substring() {
        let out = Output {
            stdout: "ok\nmore ok\n".into(),
            stderr: "warning: foo\nError: release not found\n".into(),
            exit_status: 1,
        };
        assert_eq!(out.first_error_line(), Some("Error: release not found"));
    }
}
