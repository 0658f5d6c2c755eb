//! Metadata records tracked by the catalog.
//!
//! A [`Volume`] is a metadata record, not a physical allocation. It owns at
//! most one [`MountSession`]. [`Snapshot`]s point back at their volume by id,
//! and a [`CheckpointManifest`] references snapshots by id without owning
//! them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Root under which every volume's host path is derived.
pub const MOUNT_ROOT: &str = "/run/aionfs/mounts";

/// Volume durability class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeClass {
    #[default]
    Persistent,
    Ephemeral,
}

impl VolumeClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Ephemeral => "ephemeral",
        }
    }
}

impl FromStr for VolumeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persistent" => Ok(Self::Persistent),
            "ephemeral" => Ok(Self::Ephemeral),
            other => Err(format!(
                "unknown volume class '{other}', expected 'persistent' or 'ephemeral'"
            )),
        }
    }
}

/// Transport through which a volume is exported to its consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Filesystem export (bind-mountable directory).
    #[default]
    Fs,
    /// Raw block device export.
    Block,
    /// NFS export.
    Nfs,
}

impl ExportMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fs => "fs",
            Self::Block => "block",
            Self::Nfs => "nfs",
        }
    }
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" => Ok(Self::Fs),
            "block" => Ok(Self::Block),
            "nfs" => Ok(Self::Nfs),
            other => Err(format!(
                "unknown export mode '{other}', expected 'fs', 'block' or 'nfs'"
            )),
        }
    }
}

/// Whether a volume currently has a live mount session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachState {
    #[default]
    Available,
    Attached,
}

impl fmt::Display for AttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Available => "available",
            Self::Attached => "attached",
        })
    }
}

/// State of the prepared export behind a volume's mount handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountState {
    /// Export still being prepared. Reserved; this core never sets it.
    Preparing,
    #[default]
    Available,
    Attached,
}

impl From<AttachState> for MountState {
    fn from(state: AttachState) -> Self {
        match state {
            AttachState::Available => Self::Available,
            AttachState::Attached => Self::Attached,
        }
    }
}

/// Information about a volume's prepared export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountHandle {
    pub mode: ExportMode,
    pub host_path: String,
    pub state: MountState,
}

/// A single active consumer attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSession {
    pub session_id: String,
    /// Always equal to the volume owner.
    pub principal: String,
    /// Opaque descriptor of the attaching client.
    #[serde(default)]
    pub consumer_endpoint: String,
    pub attached_at: DateTime<Utc>,
}

/// A volume metadata record.
///
/// Invariant: `attach_session.is_some()` iff `attach_state == Attached`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub volume_id: String,
    /// Immutable after creation.
    pub owner_principal: String,
    pub class: VolumeClass,
    /// Advisory only; nothing enforces it.
    pub quota_bytes: u64,
    #[serde(default)]
    pub policy_profile: String,
    pub export_mode: ExportMode,
    pub mount_handle: MountHandle,
    pub attach_state: AttachState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach_session: Option<MountSession>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Volume {
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attach_state == AttachState::Attached
    }

    /// Whether the session/state invariant holds for this record.
    #[must_use]
    pub fn session_consistent(&self) -> bool {
        self.attach_session.is_some() == self.is_attached()
    }

    /// Replace the session; attach state and mount handle state follow it.
    pub(crate) fn set_session(&mut self, session: Option<MountSession>) {
        self.attach_state = if session.is_some() {
            AttachState::Attached
        } else {
            AttachState::Available
        };
        self.mount_handle.state = self.attach_state.into();
        self.attach_session = session;
    }
}

/// Parameters for provisioning a new volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeSpec {
    pub owner_principal: String,
    pub class: Option<VolumeClass>,
    pub quota_bytes: u64,
    pub policy_profile: String,
    pub export_mode: Option<ExportMode>,
}

/// A point-in-time marker for one volume. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub volume_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// An immutable aggregation of snapshot ids across volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub manifest_id: String,
    /// One id per participating volume, in request order.
    pub snapshot_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Generate `<prefix>-<8 lowercase hex chars>`.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{prefix}-{suffix}")
}

/// Host path for a volume, derived only from its id.
#[must_use]
pub fn host_path_for(volume_id: &str) -> String {
    format!("{MOUNT_ROOT}/{volume_id}")
}

/// Deserialize an optional enum where `null`, a missing field and `""` all
/// mean "use the default".
///
/// # Errors
///
/// Returns the `FromStr` error of `T` for non-empty unknown values.
pub fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = String>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
