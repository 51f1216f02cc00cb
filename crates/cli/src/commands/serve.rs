//! `llmcraft serve`: Start the HTTP API server.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.server.port = port;
    }

    println!("llmcraft server");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Model:     {} at {}", config.model.chat_model, config.model.base_url);
    println!("   Documents: {}", config.retrieval.docs_path.display());

    llmcraft_gateway::start(config).await?;

    Ok(())
}
