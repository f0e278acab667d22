//! Handlers for `POST /upscale/stream` and `POST /upscale`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderName;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Sse};
use axum::Json;
use futures::Stream;
use image::DynamicImage;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::Instrument;
use upscaler_core::chain::{select_chain, ProviderDescriptor};
use upscaler_core::events::StreamEvent;
use upscaler_core::request::{check_output_size, UpscaleParams};
use upscaler_core::types::ImageSize;
use upscaler_providers::codec::{decode_rgb, read_size};
use upscaler_providers::ProviderCatalog;

use crate::error::{AppError, AppResult};
use crate::handlers::form::parse_upscale_form;
use crate::state::AppState;

/// Events buffered between the orchestrator and the HTTP body.
const EVENT_BUFFER: usize = 16;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Everything the orchestrator needs, resolved at ingress.
struct PreparedJob {
    image: Arc<DynamicImage>,
    params: UpscaleParams,
    chain: Vec<ProviderDescriptor>,
    catalog: Arc<dyn ProviderCatalog>,
}

/// Parse and validate the form, decode the image and select the chain
/// against the current model snapshot.
async fn prepare(state: &AppState, multipart: Multipart) -> AppResult<PreparedJob> {
    let request = parse_upscale_form(multipart).await?;
    let params = request.params().clone();

    let max_pixels = state.config.max_output_pixels;
    let image = tokio::task::spawn_blocking(move || {
        let source = read_size(request.image_bytes())?;
        check_output_size(source, request.scale(), max_pixels)?;
        decode_rgb(request.image_bytes())
    })
    .await
    .map_err(|e| AppError::InternalError(format!("Image decode worker failed: {e}")))??;

    let snapshot = state.models.snapshot();
    let chain = select_chain(params.accelerated, snapshot.as_ref());

    tracing::info!(
        width = image.width(),
        height = image.height(),
        scale = params.scale,
        denoise = params.denoise,
        creativity = params.creativity,
        accelerated = params.accelerated,
        color_correction = %params.color_correction,
        chain = ?chain.iter().map(|d| d.label.as_str()).collect::<Vec<_>>(),
        "Upscale request accepted",
    );

    Ok(PreparedJob {
        image: Arc::new(image),
        params,
        chain,
        catalog: snapshot,
    })
}

/// POST /upscale/stream
///
/// Streams `start`, `progress`, `fallback` and a final `complete` or
/// `error` event as server-sent events, one JSON object per `data:` line.
pub async fn upscale_stream(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let job = prepare(&state, multipart).await?;
    let (event_tx, mut event_rx) = mpsc::channel::<StreamEvent>(EVENT_BUFFER);

    let orchestrator = state.orchestrator.clone();
    let span = tracing::info_span!("upscale_job", scale = job.params.scale);
    tokio::spawn(
        async move {
            orchestrator
                .run(job.image, job.params, job.chain, job.catalog, event_tx)
                .await;
        }
        .instrument(span),
    );

    let stream = async_stream::stream! {
        while let Some(event) = event_rx.recv().await {
            let is_terminal = event.is_terminal();
            yield Ok::<_, Infallible>(Event::default().data(encode_event(&event)));
            if is_terminal {
                break;
            }
        }
    };

    Ok(sse_response(stream))
}

fn sse_response<S>(stream: S) -> impl IntoResponse
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    (
        [(CACHE_CONTROL, "no-cache"), (X_ACCEL_BUFFERING, "no")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

fn encode_event(event: &StreamEvent) -> String {
    event.to_json().unwrap_or_else(|e| {
        tracing::error!(error = %e, kind = event.kind(), "Failed to encode stream event");
        r#"{"type":"error","error":"Failed to encode event"}"#.to_string()
    })
}

/// Response of the non-streaming endpoint.
#[derive(Debug, Serialize)]
pub struct UpscaleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<ImageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscaled_size: Option<ImageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpscaleResponse {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            image_base64: None,
            original_size: None,
            upscaled_size: None,
            method: None,
            error: Some(error),
        }
    }
}

/// POST /upscale
///
/// Same inputs as the streaming endpoint; returns only the terminal result.
pub async fn upscale(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<UpscaleResponse>> {
    let job = prepare(&state, multipart).await?;

    let terminal = state
        .orchestrator
        .run_to_terminal(job.image, job.params, job.chain, job.catalog)
        .instrument(tracing::info_span!("upscale_job"))
        .await;

    let response = match terminal {
        Some(StreamEvent::Complete {
            image,
            original_size,
            upscaled_size,
            method,
        }) => UpscaleResponse {
            success: true,
            image_base64: Some(image),
            original_size: Some(original_size),
            upscaled_size: Some(upscaled_size),
            method: Some(method),
            error: None,
        },
        Some(StreamEvent::Error { error }) => UpscaleResponse::failed(error),
        other => {
            return Err(AppError::InternalError(format!(
                "Upscale finished without a terminal event: {other:?}"
            )))
        }
    };
    Ok(Json(response))
}
