use std::time::Duration;

use upscaler_pipeline::relay::MAX_RELAY_CAPACITY;
use upscaler_pipeline::OrchestratorConfig;
use upscaler_providers::config::ProviderConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    /// A single `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// Timeout in seconds for every route except the upscale endpoints.
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size in bytes.
    pub max_upload_bytes: usize,
    /// Largest accepted output, in pixels (`w * scale * h * scale`).
    pub max_output_pixels: u64,
    /// Progress relay poll timeout in milliseconds.
    pub progress_poll_ms: u64,
    /// Progress relay queue capacity, clamped to `1..=64`.
    pub progress_relay_capacity: usize,
    /// Provider and model-loading settings.
    pub providers: ProviderConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default     |
    /// |---------------------------|-------------|
    /// | `HOST`                    | `0.0.0.0`   |
    /// | `PORT`                    | `8000`      |
    /// | `CORS_ORIGINS`            | `*`         |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`        |
    /// | `MAX_UPLOAD_BYTES`        | `104857600` |
    /// | `MAX_OUTPUT_PIXELS`       | `67108864`  |
    /// | `PROGRESS_POLL_MS`        | `100`       |
    /// | `PROGRESS_RELAY_CAPACITY` | `8`         |
    ///
    /// Provider variables are documented on [`ProviderConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "104857600".into())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let max_output_pixels: u64 = std::env::var("MAX_OUTPUT_PIXELS")
            .unwrap_or_else(|_| "67108864".into())
            .parse()
            .expect("MAX_OUTPUT_PIXELS must be a valid u64");

        let progress_poll_ms: u64 = std::env::var("PROGRESS_POLL_MS")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("PROGRESS_POLL_MS must be a valid u64");

        let progress_relay_capacity: usize = std::env::var("PROGRESS_RELAY_CAPACITY")
            .unwrap_or_else(|_| "8".into())
            .parse::<usize>()
            .expect("PROGRESS_RELAY_CAPACITY must be a valid usize")
            .clamp(1, MAX_RELAY_CAPACITY);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            max_output_pixels,
            progress_poll_ms,
            progress_relay_capacity,
            providers: ProviderConfig::from_env(),
        }
    }

    /// Whether CORS should allow any origin.
    pub fn cors_allows_any(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_millis(self.progress_poll_ms.max(1)),
            relay_capacity: self.progress_relay_capacity,
        }
    }
}
