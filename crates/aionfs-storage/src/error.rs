//! Storage error types.
//!
//! Every error variant carries the path involved and the underlying reason so
//! a failed flush can be diagnosed from the log line alone.

/// Errors that can occur while loading or replacing the state blob.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to prepare the storage location (e.g. create the data directory).
    #[error("failed to open storage at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Failed to read the committed state.
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Failed to write the staged state.
    #[error("failed to write '{path}': {reason}")]
    Write { path: String, reason: String },

    /// Failed to make written data durable.
    #[error("failed to sync '{path}': {reason}")]
    Sync { path: String, reason: String },

    /// Failed to move the staged state over the committed one.
    #[error("failed to replace '{to}' with '{from}': {reason}")]
    Rename {
        from: String,
        to: String,
        reason: String,
    },
}
