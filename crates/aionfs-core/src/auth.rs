//! Principal resolution and the authorization policy.
//!
//! Credentials are resolved to principals by a [`PrincipalResolver`]. The
//! shipped resolver is [`StaticTokenResolver`], a fixed map of bearer token to
//! principal. Tokens are held only as SHA-256 digests; the plaintext never
//! stays in memory after load.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Maps an opaque credential to a principal.
pub trait PrincipalResolver: Send + Sync + 'static {
    /// The principal for `credential`, or `None` if it is not recognised.
    fn resolve(&self, credential: &str) -> Option<String>;
}

/// Whether ownership checks are enforced. Chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPolicy {
    /// No resolver configured; every request runs anonymously and ownership
    /// is not checked.
    #[default]
    Disabled,
    /// Every request must carry a resolved principal; only owners may touch
    /// their volumes.
    Enabled,
}

/// Identity attached to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Principal(String),
}

impl Caller {
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Principal(p) => Some(p),
        }
    }
}

/// Static bearer-token resolver backed by a JSON map file
/// (`{"<token>": "<principal>"}`).
pub struct StaticTokenResolver {
    by_digest: HashMap<String, String>,
}

impl StaticTokenResolver {
    /// Load the token map from `path`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Read`] if the file cannot be read.
    /// - [`AuthError::Parse`] if it is not a JSON object of strings.
    /// - [`AuthError::Empty`] if it has no entries.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| AuthError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let map: HashMap<String, String> =
            serde_json::from_slice(&raw).map_err(|e| AuthError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_map(map)
    }

    /// Build from an in-memory token map.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Empty`] if `tokens` is empty.
    pub fn from_map(tokens: HashMap<String, String>) -> Result<Self, AuthError> {
        if tokens.is_empty() {
            return Err(AuthError::Empty);
        }
        let by_digest = tokens
            .into_iter()
            .map(|(token, principal)| (digest_token(&token), principal))
            .collect();
        Ok(Self { by_digest })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}

impl PrincipalResolver for StaticTokenResolver {
    fn resolve(&self, credential: &str) -> Option<String> {
        self.by_digest.get(&digest_token(credential)).cloned()
    }
}

impl std::fmt::Debug for StaticTokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenResolver")
            .field("tokens", &self.by_digest.len())
            .finish()
    }
}

/// Hex-encoded SHA-256 of a plaintext token.
#[must_use]
pub fn digest_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}
