//! # llmcraft Core
//!
//! Domain types, traits, and error definitions for the llmcraft conversation
//! pipeline. This crate has **no framework dependencies**: it defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: the chat model backend (complete, stream, embed)
//! - [`VectorStore`]: nearest-neighbour search over indexed chunks
//! - [`SessionMemory`]: bounded per-session message history
//! - [`Tool`]: a callable capability exposed to the model
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted mocks without touching the pipeline.

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use memory::SessionMemory;
pub use message::{Message, MessageToolCall, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use retrieval::{DocumentChunk, RetrievedDocument, ScoredChunk, VectorStore};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
