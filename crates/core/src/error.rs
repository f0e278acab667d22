#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Every provider in the chain failed, including the terminal fallback.
    #[error("All upscaling providers failed: {0}")]
    ChainExhausted(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::Validation(errors.to_string())
    }
}
