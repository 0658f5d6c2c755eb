//! Lifecycle orchestrator.
//!
//! The single entry point for callers of the core. Each operation validates
//! its request, applies the [`AuthPolicy`] gate and then delegates to the
//! registry, mount sessions, snapshot catalog or checkpoint aggregator. The
//! orchestrator keeps no state of its own beyond the shared [`Catalog`].
//!
//! With [`AuthPolicy::Enabled`] every operation requires a resolved
//! [`Caller::Principal`] and only the owner of a volume may act on it. With
//! [`AuthPolicy::Disabled`] the caller is ignored and ownership is not
//! checked.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::{AuthPolicy, Caller};
use crate::catalog::Catalog;
use crate::checkpoints::CheckpointAggregator;
use crate::error::{CatalogError, LifecycleError, StoreError};
use crate::model::{
    CheckpointManifest, ExportMode, Snapshot, Volume, VolumeClass, VolumeSpec, empty_as_none,
};
use crate::registry::VolumeRegistry;
use crate::session::{AttachParams, MountSessions, ReattachPolicy};
use crate::snapshots::SnapshotCatalog;

/// Request body for volume creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateVolume {
    /// Defaults to the caller when authorization is enabled.
    #[serde(default)]
    pub owner_principal: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub class: Option<VolumeClass>,
    #[serde(default)]
    pub quota_bytes: u64,
    #[serde(default)]
    pub policy_profile: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub export_mode: Option<ExportMode>,
}

/// Request body for a partial volume update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateVolume {
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    #[serde(default)]
    pub policy_profile: Option<String>,
}

/// Request body for attach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AttachVolume {
    /// Defaults to the caller when authorization is enabled.
    #[serde(default)]
    pub principal: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub consumer_endpoint: String,
}

/// Request body for detach. The session id is accepted but not matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DetachVolume {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateSnapshot {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateCheckpoint {
    /// Empty or absent means every volume visible to the caller.
    #[serde(default)]
    pub volume_ids: Option<Vec<String>>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Request-level facade over the core components.
pub struct Lifecycle {
    catalog: Arc<Catalog>,
    registry: VolumeRegistry,
    sessions: MountSessions,
    snapshots: SnapshotCatalog,
    checkpoints: CheckpointAggregator,
    auth: AuthPolicy,
}

impl Lifecycle {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, auth: AuthPolicy, reattach: ReattachPolicy) -> Self {
        Self {
            registry: VolumeRegistry::new(Arc::clone(&catalog)),
            sessions: MountSessions::new(Arc::clone(&catalog), reattach),
            snapshots: SnapshotCatalog::new(Arc::clone(&catalog)),
            checkpoints: CheckpointAggregator::new(Arc::clone(&catalog)),
            catalog,
            auth,
        }
    }

    #[must_use]
    pub fn auth_policy(&self) -> AuthPolicy {
        self.auth
    }

    #[must_use]
    pub fn reattach_policy(&self) -> ReattachPolicy {
        self.sessions.policy()
    }

    /// Provision a volume.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Unauthenticated`] without a principal while enabled.
    /// - [`LifecycleError::MissingOwner`] without an owner while disabled.
    /// - [`LifecycleError::PrincipalMismatch`] if the owner is not the caller.
    /// - [`LifecycleError::Catalog`] if the commit fails.
    pub async fn create_volume(
        &self,
        caller: &Caller,
        req: CreateVolume,
    ) -> Result<Volume, LifecycleError> {
        let principal = self.principal(caller)?;

        let owner_principal = match (req.owner_principal.is_empty(), principal) {
            (true, Some(p)) => p.to_owned(),
            (true, None) => return Err(LifecycleError::MissingOwner),
            (false, Some(p)) if req.owner_principal != p => {
                warn!(caller = %p, owner = %req.owner_principal, "create rejected: owner is not the caller");
                return Err(LifecycleError::PrincipalMismatch {
                    reason: "owner must match token principal".to_owned(),
                });
            }
            (false, _) => req.owner_principal,
        };

        let volume = self
            .registry
            .create(VolumeSpec {
                owner_principal,
                class: req.class,
                quota_bytes: req.quota_bytes,
                policy_profile: req.policy_profile,
                export_mode: req.export_mode,
            })
            .await?;
        Ok(volume)
    }

    /// # Errors
    ///
    /// `Unauthenticated`, `NotFound` or `PrincipalMismatch`.
    pub async fn get_volume(&self, caller: &Caller, volume_id: &str) -> Result<Volume, LifecycleError> {
        let principal = self.principal(caller)?;
        self.owned_volume(principal, volume_id).await
    }

    /// Every volume while disabled; the caller's own volumes while enabled.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Unauthenticated`] without a principal while enabled.
    pub async fn list_volumes(&self, caller: &Caller) -> Result<Vec<Volume>, LifecycleError> {
        Ok(match self.principal(caller)? {
            Some(p) => self.registry.list_by_owner(p).await,
            None => self.registry.list_all().await,
        })
    }

    /// Change the quota and/or policy profile of a volume.
    ///
    /// Ownership is checked inside the same commit as the change.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `NotFound`, `PrincipalMismatch` or a store failure.
    pub async fn update_volume(
        &self,
        caller: &Caller,
        volume_id: &str,
        req: UpdateVolume,
    ) -> Result<Volume, LifecycleError> {
        let principal = self.principal(caller)?;

        let volume = self
            .registry
            .modify(volume_id, |volume| {
                authorize(volume, principal)?;
                if let Some(quota) = req.quota_bytes {
                    volume.quota_bytes = quota;
                }
                if let Some(profile) = req.policy_profile {
                    volume.policy_profile = profile;
                }
                Ok(())
            })
            .await?;

        info!(
            volume_id = %volume.volume_id,
            quota_bytes = volume.quota_bytes,
            policy_profile = %volume.policy_profile,
            "volume updated"
        );
        Ok(volume)
    }

    /// # Errors
    ///
    /// `Unauthenticated`, `NotFound`, `PrincipalMismatch` or a store failure.
    pub async fn delete_volume(&self, caller: &Caller, volume_id: &str) -> Result<(), LifecycleError> {
        let principal = self.principal(caller)?;
        if principal.is_some() {
            self.owned_volume(principal, volume_id).await?;
        }
        self.registry.delete(volume_id).await?;
        Ok(())
    }

    /// Attach a session to a volume.
    ///
    /// The request principal defaults to the caller while enabled and must
    /// match it when given. Either way it must be the volume owner.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Unauthenticated`] without a principal while enabled.
    /// - [`LifecycleError::MissingPrincipal`] without a principal while disabled.
    /// - [`LifecycleError::PrincipalMismatch`] if the request names someone
    ///   other than the caller.
    /// - `NotFound`, `PrincipalMismatch` (not the owner), `SessionConflict`
    ///   or a store failure from the session state machine.
    pub async fn attach(
        &self,
        caller: &Caller,
        volume_id: &str,
        req: AttachVolume,
    ) -> Result<Volume, LifecycleError> {
        let caller_principal = self.principal(caller)?;

        let principal = match (req.principal.is_empty(), caller_principal) {
            (true, Some(p)) => p.to_owned(),
            (true, None) => return Err(LifecycleError::MissingPrincipal),
            (false, Some(p)) if req.principal != p => {
                warn!(volume_id = %volume_id, caller = %p, principal = %req.principal, "attach rejected: principal is not the caller");
                return Err(LifecycleError::PrincipalMismatch {
                    reason: "principal must match token principal".to_owned(),
                });
            }
            (false, _) => req.principal,
        };

        let volume = self
            .sessions
            .attach(
                volume_id,
                AttachParams {
                    principal,
                    session_id: Some(req.session_id).filter(|id| !id.is_empty()),
                    consumer_endpoint: req.consumer_endpoint,
                },
            )
            .await?;
        Ok(volume)
    }

    /// Detach whatever session is live. Idempotent.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `NotFound`, `PrincipalMismatch` or a store failure.
    pub async fn detach(
        &self,
        caller: &Caller,
        volume_id: &str,
        req: DetachVolume,
    ) -> Result<Volume, LifecycleError> {
        let principal = self.principal(caller)?;
        if let Some(session_id) = req.session_id.as_deref().filter(|id| !id.is_empty()) {
            debug!(volume_id = %volume_id, session_id = %session_id, "detach names a session; detaching whatever is live");
        }
        if principal.is_some() {
            self.owned_volume(principal, volume_id).await?;
        }
        Ok(self.sessions.detach(volume_id).await?)
    }

    /// # Errors
    ///
    /// `Unauthenticated`, `NotFound`, `PrincipalMismatch` or a store failure.
    pub async fn add_snapshot(
        &self,
        caller: &Caller,
        volume_id: &str,
        req: CreateSnapshot,
    ) -> Result<Snapshot, LifecycleError> {
        let principal = self.principal(caller)?;
        self.owned_volume(principal, volume_id).await?;
        Ok(self.snapshots.add(volume_id, req.note).await?)
    }

    /// Snapshot history of a live volume, in append order.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `NotFound` or `PrincipalMismatch`.
    pub async fn list_snapshots(
        &self,
        caller: &Caller,
        volume_id: &str,
    ) -> Result<Vec<Snapshot>, LifecycleError> {
        let principal = self.principal(caller)?;
        self.owned_volume(principal, volume_id).await?;
        Ok(self.snapshots.list(volume_id).await)
    }

    /// # Errors
    ///
    /// `Unauthenticated`, `InvalidVolume`, `PrincipalMismatch` or a store
    /// failure.
    pub async fn create_checkpoint(
        &self,
        caller: &Caller,
        req: CreateCheckpoint,
    ) -> Result<CheckpointManifest, LifecycleError> {
        let principal = self.principal(caller)?;
        let volume_ids = req.volume_ids.unwrap_or_default();
        Ok(self
            .checkpoints
            .create(&volume_ids, principal, req.note)
            .await?)
    }

    /// # Errors
    ///
    /// [`LifecycleError::Unauthenticated`] without a principal while enabled.
    pub async fn list_checkpoints(
        &self,
        caller: &Caller,
    ) -> Result<Vec<CheckpointManifest>, LifecycleError> {
        let principal = self.principal(caller)?;
        Ok(self.checkpoints.list(principal).await)
    }

    /// Flush the committed state once more (orderly shutdown).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the flush fails.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.catalog.flush().await
    }

    /// The principal ownership is checked against, or `None` while disabled.
    fn principal<'a>(&self, caller: &'a Caller) -> Result<Option<&'a str>, LifecycleError> {
        match (self.auth, caller) {
            (AuthPolicy::Disabled, _) => Ok(None),
            (AuthPolicy::Enabled, Caller::Principal(p)) => Ok(Some(p.as_str())),
            (AuthPolicy::Enabled, Caller::Anonymous) => Err(LifecycleError::Unauthenticated),
        }
    }

    async fn owned_volume(
        &self,
        principal: Option<&str>,
        volume_id: &str,
    ) -> Result<Volume, LifecycleError> {
        let volume = self.registry.get(volume_id).await?;
        authorize(&volume, principal)?;
        Ok(volume)
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("auth", &self.auth)
            .field("reattach", &self.sessions.policy())
            .finish_non_exhaustive()
    }
}

fn authorize(volume: &Volume, principal: Option<&str>) -> Result<(), CatalogError> {
    match principal {
        Some(p) if p != volume.owner_principal => {
            warn!(volume_id = %volume.volume_id, principal = %p, "access rejected: principal is not the owner");
            Err(CatalogError::PrincipalMismatch {
                volume_id: volume.volume_id.clone(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aionfs_storage::{FileBackend, MemoryBackend};

    use super::*;
    use crate::checkpoints::AUTO_SNAPSHOT_NOTE;
    use crate::model::{AttachState, MountState};

    const A: &str = "service:app1";
    const B: &str = "service:app2";

    fn as_principal(p: &str) -> Caller {
        Caller::Principal(p.to_owned())
    }

    async fn lifecycle(auth: AuthPolicy) -> Lifecycle {
        let catalog = Arc::new(Catalog::open(Arc::new(MemoryBackend::new())).await.unwrap());
        Lifecycle::new(catalog, auth, ReattachPolicy::Overwrite)
    }

    fn owned_by(owner: &str) -> CreateVolume {
        CreateVolume {
            owner_principal: owner.to_owned(),
            quota_bytes: 21_474_836_480,
            ..CreateVolume::default()
        }
    }

    fn is_short_id(id: &str, prefix: &str) -> bool {
        id.strip_prefix(prefix).is_some_and(|hex| {
            hex.len() == 8
                && hex
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        })
    }

    #[tokio::test]
    async fn example_scenario_unauthenticated() {
        let lc = lifecycle(AuthPolicy::Disabled).await;
        let anon = Caller::Anonymous;

        let volume = lc.create_volume(&anon, owned_by(A)).await.unwrap();
        assert!(is_short_id(&volume.volume_id, "vol-"));
        assert_eq!(
            volume.mount_handle.host_path,
            format!("/run/aionfs/mounts/{}", volume.volume_id)
        );
        assert_eq!(volume.quota_bytes, 21_474_836_480);
        assert_eq!(volume.attach_state, AttachState::Available);
        assert!(volume.attach_session.is_none());

        let attached = lc
            .attach(
                &anon,
                &volume.volume_id,
                AttachVolume {
                    principal: A.to_owned(),
                    ..AttachVolume::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(attached.attach_state, AttachState::Attached);
        assert!(is_short_id(&attached.attach_session.unwrap().session_id, "sess-"));

        let detached = lc
            .detach(&anon, &volume.volume_id, DetachVolume::default())
            .await
            .unwrap();
        assert_eq!(detached.attach_state, AttachState::Available);
        assert_eq!(detached.mount_handle.state, MountState::Available);
        assert!(detached.attach_session.is_none());

        let manifest = lc
            .create_checkpoint(&anon, CreateCheckpoint::default())
            .await
            .unwrap();
        assert_eq!(manifest.snapshot_ids.len(), 1);
        let history = lc.list_snapshots(&anon, &volume.volume_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].snapshot_id, manifest.snapshot_ids[0]);
        assert_eq!(history[0].note.as_deref(), Some(AUTO_SNAPSHOT_NOTE));
    }

    #[tokio::test]
    async fn unauthenticated_mode_requires_owner_and_principal() {
        let lc = lifecycle(AuthPolicy::Disabled).await;
        let anon = Caller::Anonymous;

        let err = lc.create_volume(&anon, CreateVolume::default()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::MissingOwner));

        let volume = lc.create_volume(&anon, owned_by(A)).await.unwrap();
        let err = lc
            .attach(&anon, &volume.volume_id, AttachVolume::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::MissingPrincipal));

        let err = lc
            .attach(
                &anon,
                &volume.volume_id,
                AttachVolume {
                    principal: B.to_owned(),
                    ..AttachVolume::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Catalog(CatalogError::PrincipalMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn unauthenticated_mode_skips_ownership_checks() {
        let lc = lifecycle(AuthPolicy::Disabled).await;
        let volume = lc.create_volume(&Caller::Anonymous, owned_by(A)).await.unwrap();

        // A resolved caller is ignored when the policy is disabled.
        let b = as_principal(B);
        lc.get_volume(&b, &volume.volume_id).await.unwrap();
        lc.add_snapshot(&b, &volume.volume_id, CreateSnapshot::default())
            .await
            .unwrap();
        assert_eq!(lc.list_volumes(&b).await.unwrap().len(), 1);
        lc.delete_volume(&b, &volume.volume_id).await.unwrap();
    }

    #[tokio::test]
    async fn authenticated_mode_rejects_anonymous_callers() {
        let lc = lifecycle(AuthPolicy::Enabled).await;
        let anon = Caller::Anonymous;
        assert!(matches!(
            lc.list_volumes(&anon).await,
            Err(LifecycleError::Unauthenticated)
        ));
        assert!(matches!(
            lc.create_volume(&anon, owned_by(A)).await,
            Err(LifecycleError::Unauthenticated)
        ));
        assert!(matches!(
            lc.list_checkpoints(&anon).await,
            Err(LifecycleError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn create_defaults_owner_to_caller_and_rejects_foreign_owner() {
        let lc = lifecycle(AuthPolicy::Enabled).await;
        let a = as_principal(A);

        let volume = lc.create_volume(&a, CreateVolume::default()).await.unwrap();
        assert_eq!(volume.owner_principal, A);

        let err = lc.create_volume(&a, owned_by(B)).await.unwrap_err();
        assert!(matches!(err, LifecycleError::PrincipalMismatch { .. }));
        assert_eq!(lc.list_volumes(&a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ownership_is_enforced_for_every_volume_operation() {
        let lc = lifecycle(AuthPolicy::Enabled).await;
        let a = as_principal(A);
        let b = as_principal(B);
        let id = lc.create_volume(&a, owned_by(A)).await.unwrap().volume_id;

        let mismatch = |r: Result<(), LifecycleError>| {
            assert!(
                matches!(
                    r,
                    Err(LifecycleError::Catalog(CatalogError::PrincipalMismatch { .. }))
                ),
                "expected principal mismatch, got {r:?}"
            );
        };

        mismatch(lc.get_volume(&b, &id).await.map(drop));
        mismatch(lc.attach(&b, &id, AttachVolume::default()).await.map(drop));
        mismatch(lc.detach(&b, &id, DetachVolume::default()).await.map(drop));
        mismatch(
            lc.add_snapshot(&b, &id, CreateSnapshot::default())
                .await
                .map(drop),
        );
        mismatch(lc.list_snapshots(&b, &id).await.map(drop));
        mismatch(
            lc.update_volume(&b, &id, UpdateVolume::default())
                .await
                .map(drop),
        );
        mismatch(lc.delete_volume(&b, &id).await);
        assert!(lc.list_volumes(&b).await.unwrap().is_empty());

        lc.get_volume(&a, &id).await.unwrap();
        lc.attach(&a, &id, AttachVolume::default()).await.unwrap();
        lc.detach(&a, &id, DetachVolume::default()).await.unwrap();
        lc.add_snapshot(&a, &id, CreateSnapshot::default()).await.unwrap();
        assert_eq!(lc.list_snapshots(&a, &id).await.unwrap().len(), 1);
        lc.update_volume(&a, &id, UpdateVolume::default()).await.unwrap();
        lc.delete_volume(&a, &id).await.unwrap();
    }

    #[tokio::test]
    async fn attach_principal_must_match_caller() {
        let lc = lifecycle(AuthPolicy::Enabled).await;
        let a = as_principal(A);
        let id = lc.create_volume(&a, owned_by(A)).await.unwrap().volume_id;

        let err = lc
            .attach(
                &a,
                &id,
                AttachVolume {
                    principal: B.to_owned(),
                    ..AttachVolume::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PrincipalMismatch { .. }));

        let attached = lc
            .attach(
                &a,
                &id,
                AttachVolume {
                    principal: A.to_owned(),
                    session_id: "sess-given".to_owned(),
                    consumer_endpoint: "10.0.0.7:2049".to_owned(),
                },
            )
            .await
            .unwrap();
        let session = attached.attach_session.unwrap();
        assert_eq!(session.session_id, "sess-given");
        assert_eq!(session.principal, A);
        assert_eq!(session.consumer_endpoint, "10.0.0.7:2049");
    }

    #[tokio::test]
    async fn missing_volume_is_not_found_for_owner() {
        let lc = lifecycle(AuthPolicy::Enabled).await;
        let a = as_principal(A);
        for result in [
            lc.get_volume(&a, "vol-missing").await.map(drop),
            lc.delete_volume(&a, "vol-missing").await,
            lc.list_snapshots(&a, "vol-missing").await.map(drop),
            lc.attach(&a, "vol-missing", AttachVolume::default()).await.map(drop),
        ] {
            assert!(matches!(
                result,
                Err(LifecycleError::Catalog(CatalogError::NotFound { .. }))
            ));
        }
    }

    #[tokio::test]
    async fn update_patches_only_given_fields() {
        let lc = lifecycle(AuthPolicy::Disabled).await;
        let anon = Caller::Anonymous;
        let created = lc
            .create_volume(
                &anon,
                CreateVolume {
                    policy_profile: "bronze".to_owned(),
                    ..owned_by(A)
                },
            )
            .await
            .unwrap();

        let updated = lc
            .update_volume(
                &anon,
                &created.volume_id,
                UpdateVolume {
                    quota_bytes: Some(1024),
                    policy_profile: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.quota_bytes, 1024);
        assert_eq!(updated.policy_profile, "bronze");
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.owner_principal, A);
    }

    #[tokio::test]
    async fn checkpoint_scope_follows_caller() {
        let lc = lifecycle(AuthPolicy::Enabled).await;
        let a = as_principal(A);
        let b = as_principal(B);
        let va = lc.create_volume(&a, owned_by(A)).await.unwrap().volume_id;
        let vb = lc.create_volume(&b, owned_by(B)).await.unwrap().volume_id;

        let manifest = lc
            .create_checkpoint(&a, CreateCheckpoint::default())
            .await
            .unwrap();
        assert_eq!(manifest.snapshot_ids.len(), 1);
        assert!(lc.list_snapshots(&b, &vb).await.unwrap().is_empty());

        let err = lc
            .create_checkpoint(
                &a,
                CreateCheckpoint {
                    volume_ids: Some(vec![va, vb]),
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Catalog(CatalogError::PrincipalMismatch { .. })
        ));

        assert_eq!(lc.list_checkpoints(&a).await.unwrap(), vec![manifest]);
        assert!(lc.list_checkpoints(&b).await.unwrap().is_empty());
    }

    async fn open_dir(path: &std::path::Path) -> (Lifecycle, Arc<Catalog>) {
        let backend = Arc::new(FileBackend::open(path).unwrap());
        let catalog = Arc::new(Catalog::open(backend).await.unwrap());
        let lc = Lifecycle::new(
            Arc::clone(&catalog),
            AuthPolicy::Disabled,
            ReattachPolicy::Overwrite,
        );
        (lc, catalog)
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let anon = Caller::Anonymous;

        let (lc, catalog) = open_dir(dir.path()).await;
        let v1 = lc.create_volume(&anon, owned_by(A)).await.unwrap();
        let v2 = lc.create_volume(&anon, owned_by(B)).await.unwrap();
        lc.attach(
            &anon,
            &v1.volume_id,
            AttachVolume {
                principal: A.to_owned(),
                ..AttachVolume::default()
            },
        )
        .await
        .unwrap();
        lc.add_snapshot(
            &anon,
            &v2.volume_id,
            CreateSnapshot {
                note: Some("before".to_owned()),
            },
        )
        .await
        .unwrap();
        lc.create_checkpoint(&anon, CreateCheckpoint::default())
            .await
            .unwrap();
        lc.flush().await.unwrap();
        let before = catalog.state().await;
        drop(lc);
        drop(catalog);

        let (lc, catalog) = open_dir(dir.path()).await;
        assert_eq!(catalog.state().await, before);
        assert_eq!(lc.list_checkpoints(&anon).await.unwrap().len(), 1);
        let v1 = lc.get_volume(&anon, &v1.volume_id).await.unwrap();
        assert!(v1.is_attached());
        assert!(v1.session_consistent());
    }

    #[test]
    fn request_bodies_tolerate_missing_and_empty_fields() {
        let req: CreateVolume =
            serde_json::from_str(r#"{"owner_principal": "a", "class": "", "export_mode": null}"#)
                .unwrap();
        assert_eq!(req.class, None);
        assert_eq!(req.export_mode, None);

        let req: CreateVolume = serde_json::from_str(r#"{"export_mode": "nfs"}"#).unwrap();
        assert_eq!(req.export_mode, Some(ExportMode::Nfs));
        assert!(serde_json::from_str::<CreateVolume>(r#"{"export_mode": "iscsi"}"#).is_err());

        let req: CreateCheckpoint = serde_json::from_str(r#"{"volume_ids": null}"#).unwrap();
        assert_eq!(req.volume_ids, None);
    }
}
