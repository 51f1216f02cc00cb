//! Input safety for llmcraft.
//!
//! Provides:
//! - **Guardrail**: length, sensitive-word and prompt-injection screening of
//!   user input before it reaches the model

pub mod guardrail;

pub use guardrail::{GuardrailResult, SafetyGuard};
