//! In-memory storage backend for testing.
//!
//! This backend keeps the committed blob behind a `RwLock`. It is not
//! persistent; everything is lost when the process exits. Clones share the
//! same blob, which lets a test "restart" a catalog against the state a
//! previous instance committed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError};

/// An in-memory storage backend.
///
/// Supports write-failure injection via [`MemoryBackend::fail_writes`] so
/// callers can exercise their error paths without a broken disk, and slow
/// writes via [`MemoryBackend::delay_writes`].
///
/// # Examples
///
/// ```
/// # use aionfs_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.replace(b"{}").await.unwrap();
/// assert_eq!(backend.load().await.unwrap(), Some(b"{}".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    blob: Arc<RwLock<Option<Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    write_delay_ms: Arc<AtomicU64>,
    commits: Arc<AtomicU64>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent [`replace`](StorageBackend::replace) fail (or
    /// succeed again when `fail` is `false`).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Sleep for `delay` before each subsequent replacement lands.
    pub fn delay_writes(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.write_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of successful replacements so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blob.read().await.clone())
    }

    async fn replace(&self, bytes: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                path: "memory".to_owned(),
                reason: "write failure injected".to_owned(),
            });
        }
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        *self.blob.write().await = Some(bytes.to_vec());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}
