//! Application state.

use std::sync::Arc;

use s2v_engine::EngineContext;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine: Arc<EngineContext>,
}

impl AppState {
    /// Create new application state from the environment.
    pub fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let engine = EngineContext::from_env()?;
        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    pub fn new(config: ApiConfig, engine: Arc<EngineContext>) -> Self {
        Self { config, engine }
    }
}
