//! In-memory metadata mirror and its persistence.
//!
//! The [`Catalog`] owns the whole metadata graph (volumes, per-volume snapshot
//! histories, checkpoint manifests) behind one `RwLock`. Reads share the lock;
//! every mutation goes through [`Catalog::commit`], which holds the write lock
//! across both the in-memory change and the synchronous flush.
//!
//! # Commit protocol
//!
//! 1. Clone the live state into a draft.
//! 2. Apply the mutation to the draft. An error here discards the draft.
//! 3. Serialize the draft and replace the persisted blob.
//! 4. Only after the backend confirms, swap the draft in as the live state.
//!
//! A failed flush therefore leaves both memory and disk at the last committed
//! state, and readers never observe uncommitted changes.
//!
//! Steps 3 and 4 run on their own task, which owns the write guard. Dropping
//! the caller's future (client disconnect, timeout) does not stop a flush that
//! has started, so the swap always follows a successful replace.

use std::collections::BTreeMap;
use std::sync::Arc;

use aionfs_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{CheckpointManifest, Snapshot, Volume};

/// The complete persisted metadata graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogState {
    /// Volumes keyed by id.
    pub volumes: BTreeMap<String, Volume>,
    /// Snapshot histories keyed by owning volume id, in append order.
    pub snapshots: BTreeMap<String, Vec<Snapshot>>,
    /// Checkpoint manifests keyed by id.
    pub checkpoints: BTreeMap<String, CheckpointManifest>,
}

/// On-disk shape; a `null` or missing collection loads as empty.
#[derive(Deserialize)]
struct StateFile {
    #[serde(default)]
    volumes: Option<BTreeMap<String, Volume>>,
    #[serde(default)]
    snapshots: Option<BTreeMap<String, Vec<Snapshot>>>,
    #[serde(default)]
    checkpoints: Option<BTreeMap<String, CheckpointManifest>>,
}

/// Serialize the state in its persisted form (pretty-printed JSON).
///
/// # Errors
///
/// Returns [`StoreError::Encode`] if serialization fails.
pub fn encode(state: &CatalogState) -> Result<Vec<u8>, StoreError> {
    let mut bytes = serde_json::to_vec_pretty(state).map_err(|e| StoreError::Encode {
        reason: e.to_string(),
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse and validate a persisted state blob.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if the blob is not valid JSON of the
/// expected shape, or if a record contradicts its key or the session
/// invariant.
pub fn decode(bytes: &[u8]) -> Result<CatalogState, StoreError> {
    let file: StateFile = serde_json::from_slice(bytes).map_err(|e| StoreError::Decode {
        reason: e.to_string(),
    })?;

    let state = CatalogState {
        volumes: file.volumes.unwrap_or_default(),
        snapshots: file.snapshots.unwrap_or_default(),
        checkpoints: file.checkpoints.unwrap_or_default(),
    };
    validate(&state)?;
    Ok(state)
}

fn validate(state: &CatalogState) -> Result<(), StoreError> {
    for (id, volume) in &state.volumes {
        if *id != volume.volume_id {
            return Err(StoreError::Decode {
                reason: format!("volume keyed '{id}' carries id '{}'", volume.volume_id),
            });
        }
        if !volume.session_consistent() {
            return Err(StoreError::Decode {
                reason: format!(
                    "volume '{id}' is {} but session presence disagrees",
                    volume.attach_state
                ),
            });
        }
    }
    for (volume_id, history) in &state.snapshots {
        if let Some(stray) = history.iter().find(|s| s.volume_id != *volume_id) {
            return Err(StoreError::Decode {
                reason: format!(
                    "snapshot '{}' filed under '{volume_id}' belongs to '{}'",
                    stray.snapshot_id, stray.volume_id
                ),
            });
        }
    }
    for (id, manifest) in &state.checkpoints {
        if *id != manifest.manifest_id {
            return Err(StoreError::Decode {
                reason: format!("checkpoint keyed '{id}' carries id '{}'", manifest.manifest_id),
            });
        }
    }
    Ok(())
}

/// Owner of the metadata graph and the only path to mutate it.
pub struct Catalog {
    backend: Arc<dyn StorageBackend>,
    state: Arc<RwLock<CatalogState>>,
}

impl Catalog {
    /// Load the committed state from `backend`.
    ///
    /// An empty backend yields an empty catalog.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Storage`] if the backend cannot be read.
    /// - [`StoreError::Decode`] if the persisted state is malformed.
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        let state = match backend.load().await? {
            Some(bytes) => decode(&bytes)?,
            None => CatalogState::default(),
        };

        info!(
            source = %backend.describe(),
            volumes = state.volumes.len(),
            snapshot_histories = state.snapshots.len(),
            checkpoints = state.checkpoints.len(),
            "catalog loaded"
        );

        Ok(Self {
            backend,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Run `f` against the live state under the shared lock.
    pub async fn read<R>(&self, f: impl FnOnce(&CatalogState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    /// Clone of the live state.
    pub async fn state(&self) -> CatalogState {
        self.state.read().await.clone()
    }

    /// Apply `f` to a draft of the state and commit it durably.
    ///
    /// The exclusive lock is held for the mutation and the flush. The draft
    /// becomes live only if both succeed. Once `f` has returned `Ok`, the
    /// flush and swap complete even if this future is dropped.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or the flush failure converted into `E`.
    pub async fn commit<T, E>(
        &self,
        f: impl FnOnce(&mut CatalogState) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut live = Arc::clone(&self.state).write_owned().await;
        let mut draft = live.clone();
        let out = f(&mut draft)?;

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            persist(backend.as_ref(), &draft).await?;
            *live = draft;
            Ok::<_, StoreError>(())
        })
        .await
        .map_err(|e| StoreError::Interrupted {
            reason: e.to_string(),
        })??;

        Ok(out)
    }

    /// Flush the live state again (used at orderly shutdown).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the backend fails.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let live = self.state.write().await;
        persist(self.backend.as_ref(), &live).await
    }
}

async fn persist(backend: &dyn StorageBackend, state: &CatalogState) -> Result<(), StoreError> {
    let bytes = encode(state)?;
    backend.replace(&bytes).await?;
    debug!(bytes = bytes.len(), "catalog flushed");
    Ok(())
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("backend", &self.backend.describe())
            .finish_non_exhaustive()
    }
}
