//! Client-facing stream events and their wire encoding.
//!
//! Every event serializes to a JSON object with a `"type"` tag:
//!
//! ```text
//! {"type":"start","original_size":[w,h]}
//! {"type":"progress","step":3,"total":20,"percent":15,"message":"...","preview":"..."}
//! {"type":"fallback","reason":"..."}
//! {"type":"complete","image":"<base64 png>","original_size":[w,h],"upscaled_size":[w,h],"method":"..."}
//! {"type":"error","error":"..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::progress::ProgressEvent;
use crate::types::ImageSize;

/// An event written to the client stream.
///
/// A well-formed stream is exactly one `Start`, then any number of
/// `Progress`/`Fallback`, then exactly one terminal `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        original_size: ImageSize,
    },

    Progress {
        step: u32,
        total: u32,
        percent: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preview: Option<String>,
    },

    Fallback {
        reason: String,
    },

    Complete {
        /// Base64-encoded PNG of the final image.
        image: String,
        original_size: ImageSize,
        upscaled_size: ImageSize,
        /// Label of the provider tier that served the request.
        method: String,
    },

    Error {
        error: String,
    },
}

impl StreamEvent {
    /// `true` for the events that close a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }

    /// Wire name of the event, as found in its `"type"` field.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Fallback { .. } => "fallback",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Serialize to the single-line JSON object sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ProgressEvent> for StreamEvent {
    fn from(event: ProgressEvent) -> Self {
        let percent = event.percent();
        StreamEvent::Progress {
            step: event.step,
            total: event.total,
            percent,
            message: event.message,
            preview: event.preview,
        }
    }
}
