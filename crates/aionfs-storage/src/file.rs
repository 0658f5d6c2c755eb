//! Single-file storage backend, the production default.
//!
//! The committed state lives in `<dir>/state.json`. A replacement writes the
//! new blob to `<dir>/state.json.tmp`, fsyncs it, renames it over the
//! committed file and finally fsyncs the directory so the rename itself is
//! durable. A crash at any point leaves either the old or the new file in
//! place; a stale `.tmp` is simply overwritten by the next replacement.
//!
//! Filesystem calls are synchronous, so replacements are dispatched to the
//! Tokio blocking pool via [`tokio::task::spawn_blocking`].

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{StorageBackend, StorageError};

/// File name of the committed state inside the data directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// A storage backend that keeps the state blob in one file.
///
/// # Examples
///
/// ```no_run
/// # use aionfs_storage::FileBackend;
/// let backend = FileBackend::open("/var/lib/aionfs").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) the data directory.
    ///
    /// Does not read the state file; that happens on
    /// [`load`](StorageBackend::load).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| StorageError::Open {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            path: dir.join(STATE_FILE_NAME),
            tmp_path: dir.join(format!("{STATE_FILE_NAME}.tmp")),
        })
    }

    /// Path of the committed state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn replace(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let dir = self.dir.clone();
        let path = self.path.clone();
        let tmp_path = self.tmp_path.clone();
        let bytes = bytes.to_vec();
        let len = bytes.len();

        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &tmp_path, &bytes))
            .await
            .map_err(|e| StorageError::Write {
                path: self.tmp_path.display().to_string(),
                reason: format!("blocking write task failed: {e}"),
            })??;

        debug!(path = %self.path.display(), bytes = len, "state file replaced");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn write_atomic(dir: &Path, path: &Path, tmp_path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let write_err = |e: std::io::Error| StorageError::Write {
        path: tmp_path.display().to_string(),
        reason: e.to_string(),
    };

    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }

    let mut file = opts.open(tmp_path).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.sync_all().map_err(|e| StorageError::Sync {
        path: tmp_path.display().to_string(),
        reason: e.to_string(),
    })?;
    drop(file);

    std::fs::rename(tmp_path, path).map_err(|e| StorageError::Rename {
        from: tmp_path.display().to_string(),
        to: path.display().to_string(),
        reason: e.to_string(),
    })?;

    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| StorageError::Sync {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_state_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn open_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/data");
        let backend = FileBackend::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(backend.path(), nested.join(STATE_FILE_NAME));
    }

    #[tokio::test]
    async fn replace_then_load_returns_blob() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.replace(b"{\"volumes\":{}}").await.unwrap();
        assert_eq!(
            backend.load().await.unwrap(),
            Some(b"{\"volumes\":{}}".to_vec())
        );

        backend.replace(b"{}").await.unwrap();
        assert_eq!(backend.load().await.unwrap(), Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn replace_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.replace(b"data").await.unwrap();

        assert!(!dir.path().join("state.json.tmp").exists());
        assert!(dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn stale_temp_file_does_not_affect_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.replace(b"committed").await.unwrap();

        // Simulate a crash between writing the temp file and renaming it.
        std::fs::write(dir.path().join("state.json.tmp"), b"half-writ").unwrap();

        let reopened = FileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(b"committed".to_vec()));

        reopened.replace(b"next").await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(b"next".to_vec()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn state_file_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.replace(b"secret-ish").await.unwrap();

        let mode = std::fs::metadata(backend.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
