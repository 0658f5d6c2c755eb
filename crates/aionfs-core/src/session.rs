//! Mount session state machine.
//!
//! A volume is either `available` (no session) or `attached` (exactly one
//! session). Attach requires the principal to be the volume owner. Detach is
//! valid from either state and always lands in `available`.
//!
//! What happens when attach hits an already attached volume is decided by
//! [`ReattachPolicy`], chosen once at construction. Sessions have no timeout;
//! they live until an explicit detach.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::model::{MountSession, Volume, generate_id};
use crate::registry::lookup_mut;

/// Behaviour of attach on a volume that already has a live session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReattachPolicy {
    /// Replace the live session with the new one.
    #[default]
    Overwrite,
    /// Fail with [`CatalogError::SessionConflict`].
    Reject,
}

impl FromStr for ReattachPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown re-attach policy '{other}', expected 'overwrite' or 'reject'"
            )),
        }
    }
}

/// Parameters of an attach transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachParams {
    /// Must equal the volume owner.
    pub principal: String,
    /// Generated when absent or empty.
    pub session_id: Option<String>,
    pub consumer_endpoint: String,
}

/// Attach/detach transitions over the shared catalog.
pub struct MountSessions {
    catalog: Arc<Catalog>,
    policy: ReattachPolicy,
}

impl MountSessions {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, policy: ReattachPolicy) -> Self {
        Self { catalog, policy }
    }

    #[must_use]
    pub fn policy(&self) -> ReattachPolicy {
        self.policy
    }

    /// Attach a session to a volume.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if the volume is unknown.
    /// - [`CatalogError::PrincipalMismatch`] if `principal` is not the owner.
    /// - [`CatalogError::SessionConflict`] if the volume is attached and the
    ///   policy is [`ReattachPolicy::Reject`].
    /// - [`CatalogError::Store`] if the flush fails.
    pub async fn attach(
        &self,
        volume_id: &str,
        params: AttachParams,
    ) -> Result<Volume, CatalogError> {
        let now = Utc::now();
        let policy = self.policy;

        let (volume, replaced) = self
            .catalog
            .commit(|state| {
                let volume = lookup_mut(state, volume_id)?;

                if params.principal != volume.owner_principal {
                    warn!(volume_id = %volume_id, principal = %params.principal, "attach rejected: principal is not the owner");
                    return Err(CatalogError::PrincipalMismatch {
                        volume_id: volume_id.to_owned(),
                    });
                }

                let replaced = match (&volume.attach_session, policy) {
                    (Some(live), ReattachPolicy::Reject) => {
                        return Err(CatalogError::SessionConflict {
                            volume_id: volume_id.to_owned(),
                            session_id: live.session_id.clone(),
                        });
                    }
                    (Some(live), ReattachPolicy::Overwrite) => Some(live.session_id.clone()),
                    (None, _) => None,
                };

                let session_id = params
                    .session_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| generate_id("sess"));

                volume.set_session(Some(MountSession {
                    session_id,
                    principal: params.principal,
                    consumer_endpoint: params.consumer_endpoint,
                    attached_at: now,
                }));
                volume.updated_at = now;
                Ok((volume.clone(), replaced))
            })
            .await?;

        if let Some(previous) = replaced {
            warn!(volume_id = %volume_id, previous_session = %previous, "live session overwritten by re-attach");
        }
        if let Some(session) = &volume.attach_session {
            info!(volume_id = %volume_id, session_id = %session.session_id, "volume attached");
        }

        Ok(volume)
    }

    /// Clear the session and return to `available`. Idempotent.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if the volume is unknown.
    /// - [`CatalogError::Store`] if the flush fails.
    pub async fn detach(&self, volume_id: &str) -> Result<Volume, CatalogError> {
        let now = Utc::now();
        let (volume, ended) = self
            .catalog
            .commit(|state| {
                let volume = lookup_mut(state, volume_id)?;
                let ended = volume.attach_session.take().map(|s| s.session_id);
                volume.set_session(None);
                volume.updated_at = now;
                Ok::<_, CatalogError>((volume.clone(), ended))
            })
            .await?;

        match ended {
            Some(session_id) => info!(volume_id = %volume_id, session_id = %session_id, "volume detached"),
            None => info!(volume_id = %volume_id, "detach on available volume"),
        }

        Ok(volume)
    }
}

impl std::fmt::Debug for MountSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountSessions")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aionfs_storage::MemoryBackend;

    use super::*;
    use crate::model::{AttachState, MountState, VolumeSpec};
    use crate::registry::VolumeRegistry;

    async fn setup(policy: ReattachPolicy) -> (MountSessions, VolumeRegistry, Volume) {
        let catalog = Arc::new(
            Catalog::open(Arc::new(MemoryBackend::new()))
                .await
                .unwrap(),
        );
        let registry = VolumeRegistry::new(Arc::clone(&catalog));
        let volume = registry
            .create(VolumeSpec {
                owner_principal: "service:app1".to_owned(),
                ..VolumeSpec::default()
            })
            .await
            .unwrap();
        (MountSessions::new(catalog, policy), registry, volume)
    }

    fn params(principal: &str) -> AttachParams {
        AttachParams {
            principal: principal.to_owned(),
            session_id: None,
            consumer_endpoint: "unix:///run/app1.sock".to_owned(),
        }
    }

    #[tokio::test]
    async fn attach_generates_session_and_moves_to_attached() {
        let (sessions, _, volume) = setup(ReattachPolicy::Overwrite).await;
        let attached = sessions
            .attach(&volume.volume_id, params("service:app1"))
            .await
            .unwrap();

        assert_eq!(attached.attach_state, AttachState::Attached);
        assert_eq!(attached.mount_handle.state, MountState::Attached);
        let session = attached.attach_session.unwrap();
        assert!(session.session_id.starts_with("sess-"));
        assert_eq!(session.session_id.len(), "sess-".len() + 8);
        assert_eq!(session.principal, "service:app1");
        assert_eq!(session.consumer_endpoint, "unix:///run/app1.sock");
    }

    #[tokio::test]
    async fn attach_keeps_supplied_session_id() {
        let (sessions, _, volume) = setup(ReattachPolicy::Overwrite).await;
        let attached = sessions
            .attach(
                &volume.volume_id,
                AttachParams {
                    session_id: Some("sess-custom".to_owned()),
                    ..params("service:app1")
                },
            )
            .await
            .unwrap();
        assert_eq!(attached.attach_session.unwrap().session_id, "sess-custom");
    }

    #[tokio::test]
    async fn attach_by_non_owner_is_rejected_and_state_unchanged() {
        let (sessions, registry, volume) = setup(ReattachPolicy::Overwrite).await;
        let err = sessions
            .attach(&volume.volume_id, params("service:intruder"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PrincipalMismatch { .. }));

        let current = registry.get(&volume.volume_id).await.unwrap();
        assert_eq!(current.attach_state, AttachState::Available);
        assert!(current.attach_session.is_none());
    }

    #[tokio::test]
    async fn attach_unknown_volume_is_not_found() {
        let (sessions, _, _) = setup(ReattachPolicy::Overwrite).await;
        let err = sessions
            .attach("vol-missing", params("service:app1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reattach_overwrites_under_overwrite_policy() {
        let (sessions, _, volume) = setup(ReattachPolicy::Overwrite).await;
        let first = sessions
            .attach(&volume.volume_id, params("service:app1"))
            .await
            .unwrap();
        let second = sessions
            .attach(&volume.volume_id, params("service:app1"))
            .await
            .unwrap();

        assert_ne!(
            first.attach_session.unwrap().session_id,
            second.attach_session.unwrap().session_id
        );
        assert_eq!(second.attach_state, AttachState::Attached);
    }

    #[tokio::test]
    async fn reattach_conflicts_under_reject_policy() {
        let (sessions, registry, volume) = setup(ReattachPolicy::Reject).await;
        let first = sessions
            .attach(&volume.volume_id, params("service:app1"))
            .await
            .unwrap();
        let live = first.attach_session.unwrap().session_id;

        let err = sessions
            .attach(&volume.volume_id, params("service:app1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::SessionConflict { ref session_id, .. } if *session_id == live));

        let current = registry.get(&volume.volume_id).await.unwrap();
        assert_eq!(current.attach_session.unwrap().session_id, live);
    }

    #[tokio::test]
    async fn detach_is_idempotent_and_keeps_invariant() {
        let (sessions, _, volume) = setup(ReattachPolicy::Overwrite).await;

        let detached = sessions.detach(&volume.volume_id).await.unwrap();
        assert_eq!(detached.attach_state, AttachState::Available);
        assert!(detached.session_consistent());

        sessions
            .attach(&volume.volume_id, params("service:app1"))
            .await
            .unwrap();
        let detached = sessions.detach(&volume.volume_id).await.unwrap();
        assert_eq!(detached.attach_state, AttachState::Available);
        assert_eq!(detached.mount_handle.state, MountState::Available);
        assert!(detached.attach_session.is_none());

        let again = sessions.detach(&volume.volume_id).await.unwrap();
        assert!(again.session_consistent());
        assert_eq!(again.attach_state, AttachState::Available);
    }

    #[tokio::test]
    async fn detach_unknown_volume_is_not_found() {
        let (sessions, _, _) = setup(ReattachPolicy::Overwrite).await;
        let err = sessions.detach("vol-missing").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Reject".parse::<ReattachPolicy>(), Ok(ReattachPolicy::Reject));
        assert_eq!("overwrite".parse::<ReattachPolicy>(), Ok(ReattachPolicy::Overwrite));
        assert!("ignore".parse::<ReattachPolicy>().is_err());
    }
}
