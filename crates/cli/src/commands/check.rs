//! `llmcraft check`: Screen text with the input guardrail.

use llmcraft_security::SafetyGuard;
use std::path::Path;

pub fn run(config_path: Option<&Path>, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let result = SafetyGuard::from_config(&config.guardrail).validate(text);

    if result.safe {
        println!("  safe");
    } else {
        println!("  rejected:");
        for failure in &result.failures {
            println!("    - {failure}");
        }
    }
    Ok(())
}
