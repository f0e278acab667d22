use axum::routing::post;
use axum::Router;

use crate::handlers::upscale;
use crate::state::AppState;

/// Upscale routes.
///
/// ```text
/// POST /upscale/stream     server-sent event stream of the job
/// POST /upscale            terminal result only, as JSON
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upscale/stream", post(upscale::upscale_stream))
        .route("/upscale", post(upscale::upscale))
}
