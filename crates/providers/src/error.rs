use upscaler_core::chain::ProviderTier;

/// Errors a provider invocation can fail with.
///
/// All of them are retryable from the orchestrator's point of view.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The tier was selected but is no longer loaded.
    #[error("{0} provider is not loaded")]
    Unavailable(ProviderTier),

    /// Device or host memory ran out during the call.
    #[error("resource/memory limit: {0}")]
    ResourceExhausted(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Upscaler process failed (exit code {exit_code:?}): {stderr}")]
    Subprocess {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The provider returned or wrote something that is not a usable image.
    #[error("Invalid provider output: {0}")]
    InvalidOutput(String),

    #[error("Provider panicked: {0}")]
    Panicked(String),
}
