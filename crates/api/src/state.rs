use std::sync::Arc;

use upscaler_pipeline::Orchestrator;
use upscaler_providers::loader::ModelLoader;
use upscaler_providers::state::ModelState;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Process-wide model state; handlers only read snapshots of it.
    pub models: Arc<ModelState>,
    /// The single writer of `models`.
    pub loader: Arc<ModelLoader>,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: ServerConfig, loader: ModelLoader) -> Self {
        let orchestrator = Orchestrator::new(config.orchestrator_config());
        Self {
            config: Arc::new(config),
            models: Arc::clone(loader.state()),
            loader: Arc::new(loader),
            orchestrator,
        }
    }
}
