use axum::routing::post;
use axum::Router;

use crate::handlers::models;
use crate::state::AppState;

/// Model lifecycle routes.
///
/// ```text
/// POST /load-model     start loading models in the background
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/load-model", post(models::load_model))
}
