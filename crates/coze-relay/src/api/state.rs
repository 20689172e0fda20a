//! Application state shared across handlers.

use std::sync::Arc;

use crate::relay::RelayLimits;
use crate::upstream::ChatUpstream;

/// Read-only state cloned into every request.
///
/// Nothing here is mutated per request, so concurrent relays share no
/// mutable state.
#[derive(Clone)]
pub struct AppState {
    /// Provider used to open one upstream call per request.
    pub upstream: Arc<dyn ChatUpstream>,
    /// Timeouts applied to each relayed answer.
    pub limits: RelayLimits,
    /// Allowed CORS origins; `"*"` allows any.
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(upstream: Arc<dyn ChatUpstream>, limits: RelayLimits) -> Self {
        Self {
            upstream,
            limits,
            allowed_origins: vec!["*".to_string()],
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}
