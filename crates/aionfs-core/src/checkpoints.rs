//! Checkpoint aggregator.
//!
//! A checkpoint manifest pins the latest snapshot of each requested volume.
//! Volumes without any snapshot get one created on the spot. The implicit
//! snapshots and the manifest are committed together: if any requested
//! volume is unknown or not owned by the caller, nothing is written.
//!
//! Manifests reference snapshots by id only. Snapshots of deleted volumes
//! stay referenced; listings scoped to an owner leave such manifests out.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogState};
use crate::error::CatalogError;
use crate::model::{CheckpointManifest, generate_id};
use crate::snapshots;

/// Note attached to snapshots created implicitly by a checkpoint.
pub const AUTO_SNAPSHOT_NOTE: &str = "auto-generated for checkpoint";

/// Builds and lists checkpoint manifests over the shared catalog.
pub struct CheckpointAggregator {
    catalog: Arc<Catalog>,
}

impl CheckpointAggregator {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Create a manifest over `volume_ids`, in the given order.
    ///
    /// `owner` scopes the operation to one principal: an empty request then
    /// means "every volume of `owner`", and every named volume must belong to
    /// it. With `owner = None` an empty request means every volume.
    ///
    /// Repeated ids are kept; the second occurrence reuses the snapshot the
    /// first one resolved or created.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::InvalidVolume`] if a requested volume is unknown.
    /// - [`CatalogError::PrincipalMismatch`] if a volume is not owned by `owner`.
    /// - [`CatalogError::Store`] if the flush fails.
    pub async fn create(
        &self,
        volume_ids: &[String],
        owner: Option<&str>,
        note: Option<String>,
    ) -> Result<CheckpointManifest, CatalogError> {
        let now = Utc::now();

        let (manifest, implicit) = self
            .catalog
            .commit(|state| {
                let targets = if volume_ids.is_empty() {
                    owned_volume_ids(state, owner)
                } else {
                    volume_ids.to_vec()
                };

                let mut snapshot_ids = Vec::with_capacity(targets.len());
                let mut implicit = Vec::new();

                for volume_id in &targets {
                    let volume = state.volumes.get(volume_id).ok_or_else(|| {
                        CatalogError::InvalidVolume {
                            volume_id: volume_id.clone(),
                        }
                    })?;
                    if owner.is_some_and(|p| p != volume.owner_principal) {
                        warn!(volume_id = %volume_id, "checkpoint rejected: volume not owned by caller");
                        return Err(CatalogError::PrincipalMismatch {
                            volume_id: volume_id.clone(),
                        });
                    }

                    let snapshot_id = match snapshots::latest(state, volume_id) {
                        Some(snapshot) => snapshot.snapshot_id.clone(),
                        None => {
                            let created = snapshots::append(
                                state,
                                volume_id,
                                Some(AUTO_SNAPSHOT_NOTE.to_owned()),
                                now,
                            )?;
                            implicit.push((volume_id.clone(), created.snapshot_id.clone()));
                            created.snapshot_id
                        }
                    };
                    snapshot_ids.push(snapshot_id);
                }

                let manifest = CheckpointManifest {
                    manifest_id: generate_id("chk"),
                    snapshot_ids,
                    created_at: now,
                    note: note.filter(|n| !n.is_empty()),
                };
                state
                    .checkpoints
                    .insert(manifest.manifest_id.clone(), manifest.clone());
                Ok((manifest, implicit))
            })
            .await?;

        for (volume_id, snapshot_id) in &implicit {
            info!(volume_id = %volume_id, snapshot_id = %snapshot_id, "snapshot created for checkpoint");
        }
        info!(
            manifest_id = %manifest.manifest_id,
            snapshots = manifest.snapshot_ids.len(),
            "checkpoint created"
        );

        Ok(manifest)
    }

    /// Manifests visible to `owner`, oldest first.
    ///
    /// With `owner = Some(p)`, a manifest is included only if every snapshot
    /// it references belongs to a live volume owned by `p`. Partially owned
    /// manifests are left out entirely, never redacted.
    pub async fn list(&self, owner: Option<&str>) -> Vec<CheckpointManifest> {
        self.catalog
            .read(|state| {
                let mut manifests: Vec<CheckpointManifest> = match owner {
                    None => state.checkpoints.values().cloned().collect(),
                    Some(principal) => {
                        let owned: BTreeSet<String> =
                            owned_volume_ids(state, Some(principal)).into_iter().collect();
                        state
                            .checkpoints
                            .values()
                            .filter(|m| {
                                m.snapshot_ids.iter().all(|sid| {
                                    snapshots::owning_volume(state, sid)
                                        .is_some_and(|vid| owned.contains(vid))
                                })
                            })
                            .cloned()
                            .collect()
                    }
                };
                manifests.sort_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.manifest_id.cmp(&b.manifest_id))
                });
                manifests
            })
            .await
    }
}

impl std::fmt::Debug for CheckpointAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointAggregator").finish_non_exhaustive()
    }
}

fn owned_volume_ids(state: &CatalogState, owner: Option<&str>) -> Vec<String> {
    state
        .volumes
        .values()
        .filter(|v| owner.is_none_or(|p| p == v.owner_principal))
        .map(|v| v.volume_id.clone())
        .collect()
}
