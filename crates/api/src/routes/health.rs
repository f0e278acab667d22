use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use upscaler_core::chain::{AvailabilityView, ProviderTier};

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status. Resampling always works, so this is `healthy`.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether any neural provider is loaded.
    pub model_loaded: bool,
    pub model_loading: bool,
    pub gpu_available: bool,
    pub device: &'static str,
    /// Labels of the loaded neural providers, best first.
    pub providers: Vec<String>,
    /// Last model-loading error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health -- returns service and model state.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.models.snapshot();

    let providers = ProviderTier::NEURAL
        .into_iter()
        .filter(|tier| snapshot.is_available(*tier))
        .map(|tier| snapshot.label(tier))
        .collect();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: snapshot.any_loaded(),
        model_loading: snapshot.is_loading(),
        gpu_available: snapshot.device.is_gpu(),
        device: snapshot.device.as_str(),
        providers,
        error: snapshot.error.clone(),
    })
}

/// Service description returned at the root path.
#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
    pub endpoints: Vec<&'static str>,
}

/// GET / -- service name, version and endpoint listing.
async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        model_loaded: state.models.snapshot().any_loaded(),
        endpoints: vec![
            "GET /health",
            "POST /load-model",
            "POST /upscale",
            "POST /upscale/stream",
        ],
    })
}

/// Mount health and service-info routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}
