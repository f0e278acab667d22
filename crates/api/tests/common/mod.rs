#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tower::ServiceExt;
use upscaler_api::config::ServerConfig;
use upscaler_api::router::build_app_router;
use upscaler_api::state::AppState;
use upscaler_core::chain::ProviderTier;
use upscaler_core::progress::ProgressEvent;
use upscaler_core::request::UpscaleParams;
use upscaler_providers::config::ProviderConfig;
use upscaler_providers::loader::ModelLoader;
use upscaler_providers::state::{ModelSnapshot, ModelState};
use upscaler_providers::{ProviderError, UpscaleProvider};

pub const BOUNDARY: &str = "upscaler-test-boundary";

/// Output pixel limit of [`test_config`]: a 50x50 source at 2x fits exactly.
pub const TEST_MAX_OUTPUT_PIXELS: u64 = 10_000;

/// Build a test `ServerConfig` with safe defaults.
///
/// Any CORS origin, small upload and output limits, a short relay poll
/// and no model loading on startup.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        max_output_pixels: TEST_MAX_OUTPUT_PIXELS,
        progress_poll_ms: 10,
        progress_relay_capacity: 8,
        providers: ProviderConfig {
            load_on_startup: false,
            ..Default::default()
        },
    }
}

/// Build the full application router with no neural providers loaded.
pub fn build_test_app() -> Router {
    build_test_app_with(ModelSnapshot::default())
}

/// Build the full application router starting from `snapshot`.
///
/// Uses the same [`build_app_router`] as production, so tests exercise the
/// real middleware stack.
pub fn build_test_app_with(snapshot: ModelSnapshot) -> Router {
    let config = test_config();
    let models = Arc::new(ModelState::preloaded(snapshot));
    let loader = ModelLoader::new(models, config.providers.clone());
    let state = AppState::new(config.clone(), loader);
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Fake providers
// ---------------------------------------------------------------------------

/// Neural provider stand-in: emits two steps, then returns a 4x image or
/// fails with `failure`.
pub struct ScriptedProvider {
    pub tier: ProviderTier,
    pub label: &'static str,
    pub failure: Option<&'static str>,
}

impl UpscaleProvider for ScriptedProvider {
    fn tier(&self) -> ProviderTier {
        self.tier
    }

    fn label(&self) -> String {
        self.label.to_string()
    }

    fn invoke(
        &self,
        image: &DynamicImage,
        _params: &UpscaleParams,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<DynamicImage, ProviderError> {
        on_progress(ProgressEvent::new(1, 2));
        on_progress(ProgressEvent::new(2, 2));
        if let Some(failure) = self.failure {
            return Err(ProviderError::ResourceExhausted(failure.to_string()));
        }
        Ok(image.resize_exact(image.width() * 4, image.height() * 4, FilterType::Nearest))
    }
}

/// Snapshot with a loaded restoration provider.
pub fn restoration_snapshot(failure: Option<&'static str>) -> ModelSnapshot {
    ModelSnapshot {
        restoration: Some(Arc::new(ScriptedProvider {
            tier: ProviderTier::Restoration,
            label: "realesrgan",
            failure,
        })),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_form(app: Router, uri: &str, form: Form) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(form.finish()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse a server-sent event body into its JSON `data:` payloads.
pub async fn sse_events(response: Response) -> Vec<serde_json::Value> {
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    text.split("\n\n")
        .flat_map(|block| block.lines())
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Multipart bodies
// ---------------------------------------------------------------------------

/// Minimal `multipart/form-data` body builder.
#[derive(Clone, Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    /// Form with an `image` field holding a `width x height` PNG.
    pub fn with_png(width: u32, height: u32) -> Self {
        Self::new().file("image", "input.png", &png_bytes(width, height))
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 17) as u8, (y * 23) as u8, 128])
    }));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}
