//! Helm/`kubectl` invocations (§4.5, §9 "Helm as subprocess"). Every call in
//! this module goes through [`meridian_process`]; nothing here talks to a
//! cluster except by shelling out with `KUBECONFIG` pointed at the target
//! cluster's materialized credentials. No Kubernetes client library is
//! embedded anywhere in this crate on purpose — upgrading `helm`/`kubectl` on
//! the host should never require a rebuild.

use std::path::Path;

use anyhow::{Result, bail};
use meridian_process::{Output, run};
use meridian_store::kubeconfig::FileHandle;

fn kubeconfig_env(handle: &FileHandle) -> [(&'static str, String); 1] {
    [("KUBECONFIG", handle.path().display().to_string())]
}

/// `main`/`dev`/`test` application repositories (§4.5.1 step 1, §6 `/apps`
/// query parameters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repository {
    Main,
    Development,
    Test,
}

impl Repository {
    pub fn from_query(dev: bool, test: bool) -> Self {
        if test {
            Repository::Test
        } else if dev {
            Repository::Development
        } else {
            Repository::Main
        }
    }

    pub fn helm_name(self) -> &'static str {
        match self {
            Repository::Main => "slate",
            Repository::Development => "slate-dev",
            Repository::Test => "local",
        }
    }
}

// Catalog browsing (`helm search`/`helm inspect values`) talks to the repos
// configured on this host, not to any particular cluster, so these run with
// the ambient environment and no `KUBECONFIG` override.

pub async fn helm_search(repo: Repository) -> Result<Output> {
    run::<_, &str, &str>("helm", &["search".into(), format!("{}/", repo.helm_name())], [], None).await
}

pub async fn helm_search_one(repo: Repository, app: &str) -> Result<Output> {
    let target = format!("{}/{app}", repo.helm_name());
    run::<_, &str, &str>("helm", &["search".into(), target], [], None).await
}

pub async fn helm_inspect_values(repo: Repository, app: &str) -> Result<Output> {
    let target = format!("{}/{app}", repo.helm_name());
    run::<_, &str, &str>("helm", &["inspect".into(), "values".into(), target], [], None).await
}

/// `helm install <repo>/<app> --name <release> --namespace <namespace>
/// --values <values_path>` (§4.5.1 step 7). The release name and namespace
/// are caller-controlled only through validated, already-unique instance
/// names and deterministic group namespaces — never raw request input.
pub async fn helm_install(
    kubeconfig: &FileHandle,
    repo: Repository,
    app: &str,
    release: &str,
    namespace: &str,
    values_path: &Path,
) -> Result<Output> {
    let target = format!("{}/{app}", repo.helm_name());
    let argv = vec![
        "install".to_string(),
        target,
        "--name".to_string(),
        release.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--values".to_string(),
        values_path.display().to_string(),
    ];
    run("helm", &argv, kubeconfig_env(kubeconfig), None).await
}

pub async fn helm_list(kubeconfig: &FileHandle, release: &str) -> Result<Output> {
    run("helm", &["list".into(), release.into()], kubeconfig_env(kubeconfig), None).await
}

/// `helm delete --purge <release>` (§4.5.2). Idempotent by the caller's
/// reading of the output: a prior deletion (or one that never finished
/// being created) looks like success too.
pub async fn helm_delete_purge(kubeconfig: &FileHandle, release: &str) -> Result<Output> {
    run("helm", &["delete".into(), "--purge".into(), release.to_string()], kubeconfig_env(kubeconfig), None).await
}

pub fn helm_delete_succeeded(release: &str, out: &Output) -> bool {
    let needle = format!("release \"{release}\" deleted");
    out.stdout.contains(&needle) || release_already_gone(out)
}

fn release_already_gone(out: &Output) -> bool {
    let haystack = format!("{}{}", out.stdout, out.stderr).to_lowercase();
    haystack.contains("not found") || haystack.contains("no such release") || haystack.contains("release: not found")
}

/// Ensures the group's namespace exists on a cluster (§3 invariant: "Creating
/// a Group on a Cluster is idempotent"). `kubectl create namespace` fails if
/// the namespace is already there, so that failure is swallowed.
pub async fn kubectl_ensure_namespace(kubeconfig: &FileHandle, namespace: &str) -> Result<()> {
    let out = run(
        "kubectl",
        &["create".into(), "namespace".into(), namespace.to_string()],
        kubeconfig_env(kubeconfig),
        None,
    )
    .await?;
    if out.success() || already_exists(&out) {
        return Ok(());
    }
    bail!("kubectl create namespace {namespace} failed: {}", out.stderr);
}

/// `kubectl delete namespace <namespace>`, ignoring "not found" (§4.5.3 step
/// 2).
pub async fn kubectl_delete_namespace(kubeconfig: &FileHandle, namespace: &str) -> Result<()> {
    let out = run(
        "kubectl",
        &["delete".into(), "namespace".into(), namespace.to_string()],
        kubeconfig_env(kubeconfig),
        None,
    )
    .await?;
    if out.success() || not_found(&out) {
        return Ok(());
    }
    bail!("kubectl delete namespace {namespace} failed: {}", out.stderr);
}

/// `kubectl apply -f -`, feeding `manifest` on stdin (§4.5.4).
pub async fn kubectl_apply(kubeconfig: &FileHandle, manifest: &str) -> Result<Output> {
    run("kubectl", &["apply".into(), "-f".into(), "-".into()], kubeconfig_env(kubeconfig), Some(manifest.as_bytes())).await
}

/// `kubectl delete secret <name> --namespace <namespace>`, ignoring "not
/// found".
pub async fn kubectl_delete_secret(kubeconfig: &FileHandle, namespace: &str, name: &str) -> Result<()> {
    let out = run(
        "kubectl",
        &["delete".into(), "secret".into(), name.to_string(), "--namespace".into(), namespace.to_string()],
        kubeconfig_env(kubeconfig),
        None,
    )
    .await?;
    if out.success() || not_found(&out) {
        return Ok(());
    }
    bail!("kubectl delete secret {name} failed: {}", out.stderr);
}

/// Tails logs for the pods belonging to a helm release, matched by the
/// standard `app.kubernetes.io/instance` label helm charts apply.
pub async fn kubectl_logs(
    kubeconfig: &FileHandle,
    namespace: &str,
    release: &str,
    container: Option<&str>,
    max_lines: Option<u32>,
    previous: bool,
) -> Result<Output> {
    let mut argv = vec![
        "logs".to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--selector".to_string(),
        format!("app.kubernetes.io/instance={release}"),
    ];
    if let Some(container) = container {
        argv.push("--container".to_string());
        argv.push(container.to_string());
    }
    if let Some(max_lines) = max_lines {
        argv.push("--tail".to_string());
        argv.push(max_lines.to_string());
    }
    if previous {
        argv.push("--previous".to_string());
    }
    run("kubectl", &argv, kubeconfig_env(kubeconfig), None).await
}

pub async fn kubectl_scale(kubeconfig: &FileHandle, namespace: &str, deployment: &str, replicas: u32) -> Result<Output> {
    let argv = vec![
        "scale".to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        format!("deployment/{deployment}"),
        format!("--replicas={replicas}"),
    ];
    run("kubectl", &argv, kubeconfig_env(kubeconfig), None).await
}

pub async fn kubectl_rollout_restart(kubeconfig: &FileHandle, namespace: &str, deployment: &str) -> Result<Output> {
    let argv = vec!["rollout".to_string(), "restart".to_string(), "--namespace".to_string(), namespace.to_string(), format!("deployment/{deployment}")];
    run("kubectl", &argv, kubeconfig_env(kubeconfig), None).await
}

fn not_found(out: &Output) -> bool {
    let haystack = format!("{}{}", out.stdout, out.stderr).to_lowercase();
    haystack.contains("not found")
}

fn already_exists(out: &Output) -> bool {
    let haystack = format!("{}{}", out.stdout, out.stderr).to_lowercase();
    haystack.contains("already exists")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_selection_prefers_test_over_dev() {
        assert_eq!(Repository::from_query(true, true).helm_name(), "local");
        assert_eq!(Repository::from_query(true, false).helm_name(), "slate-dev");
        assert_eq!(Repository::from_query(false, false).helm_name(), "slate");
    }

    #[test]
    fn helm_delete_succeeded_accepts_reported_deletion() {
        let out = Output {
            stdout: "release \"g1-nginx-web\" deleted\n".to_string(),
            stderr: String::new(),
            exit_status: 0,
        };
        assert!(helm_delete_succeeded("g1-nginx-web", &out));
    }

    #[test]
    fn helm_delete_succeeded_accepts_already_gone() {
        let out = Output {
            stdout: String::new(),
            stderr: "Error: release: \"g1-nginx-web\" not found\n".to_string(),
            exit_status: 1,
        };
        assert!(helm_delete_succeeded("g1-nginx-web", &out));
    }

    #[test]
    fn helm_delete_succeeded_rejects_other_failures() {
        let out = Output {
            stdout: String::new(),
            stderr: "Error: could not connect to cluster\n".to_string(),
            exit_status: 1,
        };
        assert!(!helm_delete_succeeded("g1-nginx-web", &out));
    }
}
