//! The conversation pipeline: the heart of llmcraft.
//!
//! Every turn follows the same path:
//!
//! 1. **Screen** the user text with the guardrail
//! 2. **Assemble** context (system prompt + grounding + session history)
//! 3. **Call the model**, with tools bound when enabled
//! 4. **If tool calls**: run them once, append the results, call the model
//!    again without tools
//! 5. **Commit** the user and assistant turns to session memory
//!
//! Structured requests skip memory and tools: one model call with a schema
//! example in the prompt, then JSON extraction into a typed record.

pub mod dispatch;
pub mod orchestrator;
pub mod retrieval;
pub mod stream_event;
pub mod structured;

#[cfg(test)]
mod test_helpers;

pub use dispatch::{DispatchedCall, ToolDispatcher};
pub use orchestrator::{ChatReply, Orchestrator};
pub use retrieval::RetrievalGate;
pub use stream_event::AgentStreamEvent;
pub use structured::{
    CodeReview, Report, ReportSection, SchemaTag, StructuredOutput, StructuredRecord, extract,
    extract_json,
};
