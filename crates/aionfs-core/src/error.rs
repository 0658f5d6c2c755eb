//! Error types for `aionfs-core`.
//!
//! Errors are layered the same way the components are: the persistence layer
//! reports [`StoreError`], the registry/session/snapshot/checkpoint components
//! report [`CatalogError`], and the lifecycle orchestrator adds request
//! validation and authorization failures in [`LifecycleError`]. Every variant
//! names the volume, session or reason involved.

use aionfs_storage::StorageError;

/// Errors from loading or flushing the persisted metadata state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend failed to read or replace the state blob.
    #[error("state storage error: {0}")]
    Storage(#[from] StorageError),

    /// The in-memory state could not be serialized.
    #[error("failed to encode state: {reason}")]
    Encode { reason: String },

    /// The persisted state is malformed.
    #[error("failed to decode state: {reason}")]
    Decode { reason: String },

    /// The flush task panicked or was cancelled by runtime shutdown.
    #[error("state flush interrupted: {reason}")]
    Interrupted { reason: String },
}

/// Errors from registry, mount session, snapshot and checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The referenced volume does not exist.
    #[error("volume not found: {volume_id}")]
    NotFound { volume_id: String },

    /// A checkpoint request named a volume that does not exist.
    #[error("unknown volume {volume_id}")]
    InvalidVolume { volume_id: String },

    /// The principal is not the owner of the volume.
    #[error("principal not authorised for volume {volume_id}")]
    PrincipalMismatch { volume_id: String },

    /// The volume already has a live session and re-attach is rejected.
    #[error("volume {volume_id} is already attached by session {session_id}")]
    SessionConflict {
        volume_id: String,
        session_id: String,
    },

    /// The mutation could not be committed.
    #[error("catalog store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the lifecycle orchestrator to its callers.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Authorization is enabled but the request carries no principal.
    #[error("token required")]
    Unauthenticated,

    /// Create volume without `owner_principal` while authorization is disabled.
    #[error("owner_principal is required")]
    MissingOwner,

    /// Attach without `principal` while authorization is disabled.
    #[error("principal is required")]
    MissingPrincipal,

    /// The request payload is malformed.
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// The caller's principal does not match the one named in the request.
    #[error("principal mismatch: {reason}")]
    PrincipalMismatch { reason: String },

    /// A registry, session, snapshot or checkpoint operation failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        Self::Catalog(CatalogError::Store(err))
    }
}

/// Errors from loading principal resolver configuration.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token file could not be read.
    #[error("failed to read token file {path}: {reason}")]
    Read { path: String, reason: String },

    /// The token file is not a JSON object of token to principal.
    #[error("failed to parse token file {path}: {reason}")]
    Parse { path: String, reason: String },

    /// The token map contains no usable entries.
    #[error("token map is empty")]
    Empty,
}
