//! Provider progress notifications.

use serde::{Deserialize, Serialize};

/// A single progress notification emitted by a provider.
///
/// Constructed via [`ProgressEvent::new`] and enriched with
/// [`with_message`](ProgressEvent::with_message) and
/// [`with_preview`](ProgressEvent::with_preview).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Steps completed so far.
    pub step: u32,
    /// Total number of steps; always at least 1.
    pub total: u32,
    /// Short human-readable status, e.g. `"Resizing..."`.
    pub message: Option<String>,
    /// Base64-encoded JPEG preview of the intermediate result.
    pub preview: Option<String>,
}

impl ProgressEvent {
    /// Create an event for `step` of `total`. A zero `total` is raised to 1.
    pub fn new(step: u32, total: u32) -> Self {
        Self {
            step,
            total: total.max(1),
            message: None,
            preview: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_preview(mut self, preview: String) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Completion percentage, rounded and clamped to `0..=100`.
    pub fn percent(&self) -> u8 {
        let ratio = f64::from(self.step) / f64::from(self.total);
        (ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }
}
