//! Error types for the llmcraft domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] unifies them.
//!
//! Only some failures abort a request. Guardrail rejections, extraction
//! failures and backend failures do; an uninitialized vector index and an
//! unknown tool name degrade the request instead and never reach this type.

use thiserror::Error;

/// The top-level error type for all llmcraft operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Guardrail rejection (user-correctable) ---
    #[error("Input rejected: {}", failures.join("; "))]
    Validation { failures: Vec<String> },

    // --- Structured output ---
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    // --- Chat model backend ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Vector store / ingestion backend ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller can fix this by changing the request.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Extraction(_))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Document loading failed: {0}")]
    Ingestion(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failures of the structured-output path.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// No parse strategy produced a JSON object.
    #[error("failed to extract JSON: {snippet}...")]
    NoJson { snippet: String },

    /// A JSON object was found but does not fit the target record.
    #[error("{record} does not match its schema: {reason}")]
    Schema { record: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn validation_error_lists_every_failure() {
        let err = Error::Validation {
            failures: vec!["input too long".into(), "contains sensitive words: shit".into()],
        };
        let text = err.to_string();
        assert!(text.contains("input too long"));
        assert!(text.contains("sensitive words"));
        assert!(err.is_user_error());
    }

    #[test]
    fn extraction_error_carries_snippet() {
        let err = ExtractionError::NoJson {
            snippet: "not json at all".into(),
        };
        assert_eq!(err.to_string(), "failed to extract JSON: not json at all...");
        assert!(Error::from(err).is_user_error());
    }

    #[test]
    fn backend_errors_are_not_user_errors() {
        let err = Error::Memory(MemoryError::QueryFailed("index offline".into()));
        assert!(!err.is_user_error());
    }
}
