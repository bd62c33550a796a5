//! Shared application state injected into every request handler via
//! [`axum::extract::State`].
//!
//! Generalizes the teacher's `RouterState` (`src/router.rs`): where the
//! teacher held a hot-swappable `Arc<RwLock<Arc<Config>>>` for its whole
//! LLM-routing config, this gateway splits startup-only configuration
//! ([`StaticConfig`]) from the one thing that actually changes at runtime
//! (component C1, [`RuntimeConfig`]) — see `src/config.rs`.

use std::sync::Arc;

use crate::config::{FamilyTargets, RuntimeConfig, StaticConfig};
use crate::engine::Engine;
use crate::error::AppError;

pub struct RouterState {
    pub static_config: Arc<StaticConfig>,
    pub runtime_config: Arc<RuntimeConfig>,
    pub engine: Arc<Engine>,
    pub started_at: std::time::Instant,
}

impl RouterState {
    pub fn new(static_config: Arc<StaticConfig>, runtime_config: Arc<RuntimeConfig>, engine: Arc<Engine>) -> Self {
        Self {
            static_config,
            runtime_config,
            engine,
            started_at: std::time::Instant::now(),
        }
    }

    /// Resolve `family` against the statically configured backend targets,
    /// or `UnknownFamily` if no such family was wired up at startup.
    pub fn family_targets(&self, family: &str) -> Result<&FamilyTargets, AppError> {
        self.static_config.family(family).ok_or(AppError::UnknownFamily)
    }
}
