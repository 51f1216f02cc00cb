//! Chat model backends for llmcraft.
//!
//! Every backend implements the `llmcraft_core::Provider` trait. Only the
//! OpenAI-compatible client ships today; Ollama serves that API locally.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use llmcraft_config::AppConfig;
use llmcraft_core::error::ProviderError;
use llmcraft_core::provider::Provider;
use std::sync::Arc;

/// Build the configured chat model backend.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let model = &config.model;
    let name = if model.base_url.contains(":11434") { "ollama" } else { "openai-compat" };
    tracing::info!(
        provider = name,
        base_url = %model.base_url,
        chat_model = %model.chat_model,
        embedding_model = %model.embedding_model,
        "Chat model configured"
    );
    let provider = OpenAiCompatProvider::new(name, model.base_url.clone(), model.api_key.clone())?;
    Ok(Arc::new(provider))
}
