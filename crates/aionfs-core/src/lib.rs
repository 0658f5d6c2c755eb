//! Core library for `aionfs`.
//!
//! Tracks volume metadata and its lifecycle: the volume registry, mount
//! session state machine, per-volume snapshot histories and checkpoint
//! manifests. All of it lives in one in-memory [`catalog::Catalog`] that is
//! flushed through an `aionfs-storage` backend on every committed mutation.
//!
//! Nothing here touches block devices or filesystems. A volume is a record,
//! a mount handle is a derived host path, and a snapshot is a marker.
//! [`lifecycle::Lifecycle`] is the entry point for request handlers.

pub mod auth;
pub mod catalog;
pub mod checkpoints;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod session;
pub mod snapshots;
