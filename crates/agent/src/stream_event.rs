//! Streaming chat events.
//!
//! `AgentStreamEvent` is what the orchestrator emits while a streamed reply
//! is in flight; the gateway forwards each one as an SSE event.

use serde::{Deserialize, Serialize};

/// Events emitted during a streamed chat turn, in order:
/// - `tool_call` / `tool_result`: only when the model used tools
/// - `chunk`      : partial reply text
/// - `done`       : the turn was committed to session memory
/// - `error`      : terminal failure; no `done` follows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial reply text from the model.
    Chunk { content: String },

    /// The model asked for a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool finished.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The stream is complete.
    Done { session_id: String },

    /// An error occurred mid-stream.
    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
