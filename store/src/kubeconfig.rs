//! On-disk kubeconfig materialization: `cluster id -> FileHandle`.
//!
//! A cluster's kubeconfig is exact YAML, synchronized with the cluster cache
//! tier rather than held open permanently. `FileHandle` is a reference-counted
//! token: the backing file exists for as long as at least one handle to it
//! does, and is unlinked the moment the last one drops. Only the process
//! supervisor should ever read [`FileHandle::path`] off of one of these —
//! nothing else in the store needs a raw filesystem path.

use std::collections::HashMap;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::Rng;
use uuid::Uuid;

struct FileHandleInner {
    path: PathBuf,
}

impl Drop for FileHandleInner {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), %err, "failed to unlink kubeconfig file");
        }
    }
}

/// A shared, reference-counted handle onto a materialized kubeconfig file.
/// Cloning shares the same on-disk file; the file is removed when the last
/// clone is dropped.
#[derive(Clone)]
pub struct FileHandle(Arc<FileHandleInner>);

impl FileHandle {
    /// Path to the materialized file. For supervisor use only: building a
    /// helm/kubectl invocation's `--kubeconfig` argument.
    pub fn path(&self) -> &Path {
        &self.0.path
    }
}

/// Pool of materialized kubeconfig files, one live file per cluster at a
/// time. Concurrent requests for the same cluster share a handle instead of
/// racing to write the same path.
pub struct KubeconfigPool {
    dir: PathBuf,
    handles: Mutex<HashMap<Uuid, Weak<FileHandleInner>>>,
}

impl KubeconfigPool {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Returns a handle to `cluster_id`'s kubeconfig, materializing it from
    /// `contents` if no live handle exists yet. An existing live handle is
    /// returned as-is even if `contents` differs — callers must invalidate
    /// (let all handles for a cluster drop) before a credential change can
    /// take effect, matching the cache tier's own eviction-driven lifetime.
    pub fn materialize(&self, cluster_id: Uuid, contents: &str) -> io::Result<FileHandle> {
        let mut handles = self.handles.lock();
        if let Some(existing) = handles.get(&cluster_id).and_then(Weak::upgrade) {
            return Ok(FileHandle(existing));
        }

        let path = self.write_new_file(cluster_id, contents)?;
        let inner = Arc::new(FileHandleInner { path });
        handles.insert(cluster_id, Arc::downgrade(&inner));
        Ok(FileHandle(inner))
    }

    /// Stops handing out the cluster's current handle to new callers.
    /// Already-issued handles remain valid until their last clone drops.
    pub fn forget(&self, cluster_id: Uuid) {
        self.handles.lock().remove(&cluster_id);
    }

    fn write_new_file(&self, cluster_id: Uuid, contents: &str) -> io::Result<PathBuf> {
        let suffix: u64 = rand::rng().random();
        let path = self.dir.join(format!("{cluster_id}-{suffix:016x}"));

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, contents)?;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_writes_exact_contents_with_restricted_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = KubeconfigPool::new(tmp.path()).unwrap();
        let cluster = Uuid::new_v4();

        let handle = pool.materialize(cluster, "apiVersion: v1\n").unwrap();
        let on_disk = std::fs::read_to_string(handle.path()).unwrap();
        assert_eq!(on_disk, "apiVersion: v1\n");

        let mode = std::fs::metadata(handle.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn concurrent_requests_for_same_cluster_share_one_file() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = KubeconfigPool::new(tmp.path()).unwrap();
        let cluster = Uuid::new_v4();

        let first = pool.materialize(cluster, "a").unwrap();
        let second = pool.materialize(cluster, "b").unwrap();
        assert_eq!(first.path(), second.path());
    }

    #[test]
    fn file_is_unlinked_once_last_handle_drops() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = KubeconfigPool::new(tmp.path()).unwrap();
        let cluster = Uuid::new_v4();

        let handle = pool.materialize(cluster, "a").unwrap();
        let path = handle.path().to_path_buf();
        assert!(path.exists());

        let second = handle.clone();
        drop(handle);
        assert!(path.exists(), "file should survive while a clone remains");

        drop(second);
        assert!(!path.exists(), "file should be unlinked once all handles drop");
    }

    #[test]
    fn new_handle_is_materialized_after_previous_one_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = KubeconfigPool::new(tmp.path()).unwrap();
        let cluster = Uuid::new_v4();

        let first = pool.materialize(cluster, "a").unwrap();
        let first_path = first.path().to_path_buf();
        drop(first);

        let second = pool.materialize(cluster, "b").unwrap();
        assert_ne!(first_path, second.path());
        assert_eq!(std::fs::read_to_string(second.path()).unwrap(), "b");
    }
}
