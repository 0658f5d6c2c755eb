//! Server configuration for `aionfsd`.
//!
//! Loads configuration from environment variables with defaults. Unparsable
//! addresses fall back to the default; an unknown re-attach policy aborts
//! startup so the choice is never made by accident.

use std::net::SocketAddr;
use std::path::PathBuf;

use aionfs_core::session::ReattachPolicy;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Where the metadata state is kept.
    pub storage: StorageKind,
    /// Token map file. Its presence enables authorization.
    pub token_file: Option<PathBuf>,
    /// What attach does to an already attached volume.
    pub reattach: ReattachPolicy,
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

/// Configuration that cannot be used to start the server.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `AIONFS_REATTACH` is set to something other than `overwrite` or `reject`.
    #[error("AIONFS_REATTACH: {0}")]
    Reattach(String),
}

/// Supported state backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    /// `state.json` under the given directory.
    File { dir: PathBuf },
    /// In-memory only; state is lost on exit.
    Memory,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// - `AIONFS_LISTEN`: bind address (default `0.0.0.0:7080`)
    /// - `AIONFS_DATA_DIR`: directory for `state.json` (default `./data`)
    /// - `AIONFS_STORAGE`: `file` or `memory` (default `file`)
    /// - `AIONFS_TOKEN_FILE`: JSON map of bearer token to principal (optional)
    /// - `AIONFS_REATTACH`: `overwrite` or `reject` (default `overwrite`)
    /// - `AIONFS_LOG_LEVEL`: log filter (default `info`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Reattach`] for an unknown re-attach policy.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Reattach`] for an unknown re-attach policy.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("AIONFS_LISTEN")
            .and_then(|addr| addr.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 7080)));

        let data_dir = lookup("AIONFS_DATA_DIR")
            .filter(|dir| !dir.is_empty())
            .map_or_else(|| PathBuf::from("./data"), PathBuf::from);

        let storage = match lookup("AIONFS_STORAGE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageKind::Memory,
            _ => StorageKind::File { dir: data_dir },
        };

        let token_file = lookup("AIONFS_TOKEN_FILE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let reattach = match lookup("AIONFS_REATTACH").filter(|policy| !policy.is_empty()) {
            Some(policy) => policy.parse().map_err(ConfigError::Reattach)?,
            None => ReattachPolicy::default(),
        };

        let log_level = lookup("AIONFS_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        Ok(Self {
            bind_addr,
            storage,
            token_file,
            reattach,
            log_level,
        })
    }
}
