//! Shared application state for `aionfsd`.

use std::sync::Arc;

use aionfs_core::auth::PrincipalResolver;
use aionfs_core::lifecycle::Lifecycle;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Entry point into the core.
    pub lifecycle: Arc<Lifecycle>,
    /// Bearer token resolver. `None` runs every request anonymously.
    pub resolver: Option<Arc<dyn PrincipalResolver>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("lifecycle", &self.lifecycle)
            .field("authenticated", &self.resolver.is_some())
            .finish()
    }
}
