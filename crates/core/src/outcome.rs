//! Result of a single provider invocation.

use std::time::Duration;

use crate::classify::{classify_failure, describe_failure, FailureKind};

/// Exactly one of these is produced per provider invocation.
///
/// Generic over the image type so that this crate stays free of any
/// image-processing dependency.
#[derive(Debug, Clone)]
pub enum JobOutcome<T> {
    Success {
        image: T,
        /// Wall-clock duration of the provider call.
        elapsed: Duration,
    },
    Failure {
        /// User-facing cause, already labelled by [`FailureKind`].
        cause: String,
        kind: FailureKind,
        /// Whether the orchestrator may advance to the next provider.
        retryable: bool,
    },
}

impl<T> JobOutcome<T> {
    pub fn success(image: T, elapsed: Duration) -> Self {
        JobOutcome::Success { image, elapsed }
    }

    /// Build a retryable failure from raw provider text.
    ///
    /// Every provider error is retryable at the orchestrator level; only
    /// exhaustion of the chain is terminal.
    pub fn failure(cause: impl AsRef<str>) -> Self {
        let cause = cause.as_ref();
        let kind = classify_failure(cause);
        JobOutcome::Failure {
            cause: describe_failure(kind, cause),
            kind,
            retryable: true,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}
