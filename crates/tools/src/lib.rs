//! Built-in tools for llmcraft.
//!
//! Tools give the model a few things it cannot do reliably on its own:
//! read the clock, do exact arithmetic, and fetch a vetted code snippet.

pub mod calculator;
pub mod clock;
pub mod code_examples;

use llmcraft_core::tool::ToolRegistry;

pub use calculator::CalculateTool;
pub use clock::CurrentTimeTool;
pub use code_examples::CodeExampleTool;

/// Create a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(clock::CurrentTimeTool));
    registry.register(Box::new(calculator::CalculateTool));
    registry.register(Box::new(code_examples::CodeExampleTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_builtins() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec!["calculate", "get_current_time", "search_code_example"]
        );
    }
}
