//! Event envelope pushed to clients over the session stream.
//!
//! Every event is serialized as a JSON object with a `type` discriminator and
//! framed as a single SSE `data:` line followed by a blank line:
//!
//! ```text
//! data: {"type":"generating","attempt":0}
//!
//! data: {"type":"artifact","artifact":{"items":[...]},"regeneration_count":0}
//!
//! data: {"type":"complete"}
//! ```

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Channel bound to the session
    Connected { session_id: String },

    /// A generation step started; `attempt` equals the regeneration count
    Generating { attempt: u32 },

    /// Incremental text fragment from the generation service
    Content { chunk: String },

    /// A validated candidate artifact
    Artifact {
        artifact: Artifact,
        regeneration_count: u32,
    },

    /// The generation step finished
    Complete,

    /// The accepted artifact was persisted under `id`
    Saved { id: i64 },

    /// Something failed; the session is left as it was before the step
    Error { message: String, code: String },

    /// Heartbeat
    Ping,
}

impl StreamEvent {
    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Event name as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Generating { .. } => "generating",
            StreamEvent::Content { .. } => "content",
            StreamEvent::Artifact { .. } => "artifact",
            StreamEvent::Complete => "complete",
            StreamEvent::Saved { .. } => "saved",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Ping => "ping",
        }
    }

    /// Encode as an axum SSE event (a bare `data:` line).
    pub fn to_sse(&self) -> Option<Event> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Event::default().data(json)),
            Err(e) => {
                tracing::warn!("Failed to serialize {} event: {}", self.kind(), e);
                None
            }
        }
    }
}
