//! Volume registry.
//!
//! Owns volume records: create, read, upsert, delete. The registry does not
//! authorize anything itself; callers check ownership against the records it
//! returns.
//!
//! Deleting a volume does not cascade. Its snapshot history and any
//! checkpoint references stay behind as orphans.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::catalog::{Catalog, CatalogState};
use crate::error::CatalogError;
use crate::model::{
    AttachState, MountHandle, MountState, Volume, VolumeSpec, generate_id, host_path_for,
};

/// Volume CRUD over the shared catalog.
pub struct VolumeRegistry {
    catalog: Arc<Catalog>,
}

impl VolumeRegistry {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Provision a new volume record.
    ///
    /// Assigns a fresh `vol-` id, applies the class/export defaults, derives
    /// the host path from the id and starts in the `available` state.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Store`] if the flush fails.
    pub async fn create(&self, spec: VolumeSpec) -> Result<Volume, CatalogError> {
        let now = Utc::now();
        let volume_id = generate_id("vol");
        let export_mode = spec.export_mode.unwrap_or_default();

        let volume = Volume {
            mount_handle: MountHandle {
                mode: export_mode,
                host_path: host_path_for(&volume_id),
                state: MountState::Available,
            },
            volume_id,
            owner_principal: spec.owner_principal,
            class: spec.class.unwrap_or_default(),
            quota_bytes: spec.quota_bytes,
            policy_profile: spec.policy_profile,
            export_mode,
            attach_state: AttachState::Available,
            attach_session: None,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .catalog
            .commit(|state| Ok::<_, CatalogError>(upsert(state, volume, now)))
            .await?;

        info!(
            volume_id = %created.volume_id,
            owner = %created.owner_principal,
            class = created.class.as_str(),
            export_mode = created.export_mode.as_str(),
            "volume created"
        );

        Ok(created)
    }

    /// Fetch one volume.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the id is unknown.
    pub async fn get(&self, volume_id: &str) -> Result<Volume, CatalogError> {
        self.catalog
            .read(|state| lookup(state, volume_id).cloned())
            .await
    }

    /// All volumes. Order is not significant.
    pub async fn list_all(&self) -> Vec<Volume> {
        self.catalog
            .read(|state| state.volumes.values().cloned().collect())
            .await
    }

    /// Volumes whose owner is exactly `principal`.
    pub async fn list_by_owner(&self, principal: &str) -> Vec<Volume> {
        self.catalog
            .read(|state| {
                state
                    .volumes
                    .values()
                    .filter(|v| v.owner_principal == principal)
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Insert or replace a volume record.
    ///
    /// An existing record keeps its original `created_at`; `updated_at` is
    /// always refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Store`] if the flush fails.
    pub async fn update(&self, volume: Volume) -> Result<Volume, CatalogError> {
        let now = Utc::now();
        let updated = self
            .catalog
            .commit(|state| Ok::<_, CatalogError>(upsert(state, volume, now)))
            .await?;

        info!(volume_id = %updated.volume_id, "volume updated");
        Ok(updated)
    }

    /// Look up a volume and mutate it in a single commit.
    ///
    /// `f` sees the current record; `updated_at` is refreshed afterwards.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if the id is unknown.
    /// - Any error returned by `f`.
    /// - [`CatalogError::Store`] if the flush fails.
    pub async fn modify(
        &self,
        volume_id: &str,
        f: impl FnOnce(&mut Volume) -> Result<(), CatalogError>,
    ) -> Result<Volume, CatalogError> {
        let now = Utc::now();
        self.catalog
            .commit(|state| {
                let volume = lookup_mut(state, volume_id)?;
                f(volume)?;
                volume.updated_at = now;
                Ok(volume.clone())
            })
            .await
    }

    /// Remove a volume record.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if the id is unknown.
    /// - [`CatalogError::Store`] if the flush fails.
    pub async fn delete(&self, volume_id: &str) -> Result<(), CatalogError> {
        self.catalog
            .commit(|state| {
                state
                    .volumes
                    .remove(volume_id)
                    .map(|_| ())
                    .ok_or_else(|| not_found(volume_id))
            })
            .await?;

        info!(volume_id = %volume_id, "volume deleted");
        Ok(())
    }
}

impl std::fmt::Debug for VolumeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeRegistry").finish_non_exhaustive()
    }
}

pub(crate) fn not_found(volume_id: &str) -> CatalogError {
    CatalogError::NotFound {
        volume_id: volume_id.to_owned(),
    }
}

pub(crate) fn lookup<'a>(state: &'a CatalogState, volume_id: &str) -> Result<&'a Volume, CatalogError> {
    state.volumes.get(volume_id).ok_or_else(|| not_found(volume_id))
}

pub(crate) fn lookup_mut<'a>(
    state: &'a mut CatalogState,
    volume_id: &str,
) -> Result<&'a mut Volume, CatalogError> {
    state
        .volumes
        .get_mut(volume_id)
        .ok_or_else(|| not_found(volume_id))
}

fn upsert(state: &mut CatalogState, mut volume: Volume, now: DateTime<Utc>) -> Volume {
    volume.updated_at = now;
    volume.created_at = state
        .volumes
        .get(&volume.volume_id)
        .map_or(now, |existing| existing.created_at);
    state
        .volumes
        .insert(volume.volume_id.clone(), volume.clone());
    volume
}
