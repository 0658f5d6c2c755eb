//! Persistence backends for `aionfs`.
//!
//! This crate defines the [`StorageBackend`] trait, a whole-state blob store
//! that knows nothing about volumes, snapshots, or checkpoints. The catalog in
//! `aionfs-core` serializes its complete metadata graph and hands the bytes to
//! a backend, which must replace the previously committed blob atomically.
//!
//! Two implementations are provided:
//!
//! - [`FileBackend`]: production default, a single file replaced via
//!   temp-file + fsync + rename
//! - [`MemoryBackend`]: in-memory, for tests and throwaway dev servers

mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// A pluggable store for one opaque, versioned state blob.
///
/// The blob is always written and read as a unit. There is no partial update
/// and no key space: callers serialize the entire state on every write.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Read the last committed blob.
    ///
    /// Returns `Ok(None)` if nothing has ever been committed. Absence is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying medium fails.
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the committed blob with `bytes`.
    ///
    /// Must be atomic from an external observer's point of view: after a
    /// crash, [`load`](StorageBackend::load) returns either the previous blob
    /// or the new one in full, never a mix or a truncation.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`], [`StorageError::Sync`] or
    /// [`StorageError::Rename`] if any step of the replacement fails. The
    /// previously committed blob stays in place in that case.
    async fn replace(&self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Short human-readable description for logs (e.g. the file path).
    fn describe(&self) -> String;
}
