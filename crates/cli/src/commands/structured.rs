//! `llmcraft report` / `llmcraft review`: Structured output commands.
//!
//! Both print the validated record as pretty JSON.

use std::path::Path;

pub async fn report(config_path: Option<&Path>, topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let orchestrator = llmcraft_gateway::build_orchestrator(&config, false).await?;

    let report = orchestrator.generate_report(topic).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn review(
    config_path: Option<&Path>,
    file: &Path,
    language: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let code = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let language = language.or_else(|| language_from_extension(file));

    let config = super::load_config(config_path)?;
    let orchestrator = llmcraft_gateway::build_orchestrator(&config, false).await?;

    let review = orchestrator.review_code(&code, language).await?;
    println!("{}", serde_json::to_string_pretty(&review)?);
    Ok(())
}

fn language_from_extension(file: &Path) -> Option<&'static str> {
    match file.extension()?.to_str()? {
        "py" => Some("python"),
        "rs" => Some("rust"),
        "js" | "mjs" => Some("javascript"),
        "ts" => Some("typescript"),
        "go" => Some("go"),
        "java" => Some("java"),
        _ => None,
    }
}
