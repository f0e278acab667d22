//! Handlers for model lifecycle endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use upscaler_providers::loader::LoadStatus;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LoadModelResponse {
    /// `started`, `loading` or `already_loaded`.
    pub status: &'static str,
    pub message: &'static str,
}

impl From<LoadStatus> for LoadModelResponse {
    fn from(status: LoadStatus) -> Self {
        Self {
            status: status.as_str(),
            message: status.message(),
        }
    }
}

/// POST /load-model
///
/// Starts model loading in the background. Never waits for it.
pub async fn load_model(State(state): State<AppState>) -> Json<LoadModelResponse> {
    let status = state.loader.trigger();
    tracing::info!(status = status.as_str(), "Model load requested");
    Json(status.into())
}
