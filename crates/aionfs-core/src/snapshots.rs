//! Snapshot catalog.
//!
//! Each volume has an append-only history of snapshots. Entries are never
//! reordered, mutated or removed; "latest" is simply the last entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::catalog::{Catalog, CatalogState};
use crate::error::CatalogError;
use crate::model::{Snapshot, generate_id};
use crate::registry::lookup;

/// Append-only per-volume snapshot histories over the shared catalog.
pub struct SnapshotCatalog {
    catalog: Arc<Catalog>,
}

impl SnapshotCatalog {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Record a new snapshot at the end of the volume's history.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if the volume is unknown.
    /// - [`CatalogError::Store`] if the flush fails.
    pub async fn add(
        &self,
        volume_id: &str,
        note: Option<String>,
    ) -> Result<Snapshot, CatalogError> {
        let now = Utc::now();
        let snapshot = self
            .catalog
            .commit(|state| append(state, volume_id, note, now))
            .await?;

        info!(volume_id = %volume_id, snapshot_id = %snapshot.snapshot_id, "snapshot recorded");
        Ok(snapshot)
    }

    /// Full history in append order. Empty when there is none.
    pub async fn list(&self, volume_id: &str) -> Vec<Snapshot> {
        self.catalog
            .read(|state| state.snapshots.get(volume_id).cloned().unwrap_or_default())
            .await
    }

    /// The most recently appended snapshot, if any.
    pub async fn latest(&self, volume_id: &str) -> Option<Snapshot> {
        self.catalog
            .read(|state| latest(state, volume_id).cloned())
            .await
    }

    /// Id of the volume whose history contains `snapshot_id`.
    pub async fn find_owning_volume(&self, snapshot_id: &str) -> Option<String> {
        self.catalog
            .read(|state| owning_volume(state, snapshot_id).map(str::to_owned))
            .await
    }
}

impl std::fmt::Debug for SnapshotCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCatalog").finish_non_exhaustive()
    }
}

pub(crate) fn append(
    state: &mut CatalogState,
    volume_id: &str,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<Snapshot, CatalogError> {
    lookup(state, volume_id)?;

    let snapshot = Snapshot {
        snapshot_id: generate_id("snap"),
        volume_id: volume_id.to_owned(),
        created_at: now,
        note: note.filter(|n| !n.is_empty()),
    };
    state
        .snapshots
        .entry(volume_id.to_owned())
        .or_default()
        .push(snapshot.clone());
    Ok(snapshot)
}

pub(crate) fn latest<'a>(state: &'a CatalogState, volume_id: &str) -> Option<&'a Snapshot> {
    state.snapshots.get(volume_id).and_then(|h| h.last())
}

// Linear scan; histories are small and this only runs on checkpoint listing.
pub(crate) fn owning_volume<'a>(state: &'a CatalogState, snapshot_id: &str) -> Option<&'a str> {
    state
        .snapshots
        .iter()
        .find(|(_, history)| history.iter().any(|s| s.snapshot_id == snapshot_id))
        .map(|(volume_id, _)| volume_id.as_str())
}
