//! Clock tool: the model has no sense of time without it.

use async_trait::async_trait;
use llmcraft_core::error::ToolError;
use llmcraft_core::tool::{Tool, ToolResult};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date and time. Use this when the user asks what time or date it is."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let now = chrono::Local::now().format(TIME_FORMAT).to_string();
        Ok(ToolResult::ok(self.name(), now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_formatted_local_time() {
        let result = CurrentTimeTool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.success);
        let parsed = chrono::NaiveDateTime::parse_from_str(&result.output, TIME_FORMAT);
        assert!(parsed.is_ok(), "unexpected format: {}", result.output);
    }

    #[test]
    fn takes_no_arguments() {
        let def = CurrentTimeTool.to_definition();
        assert_eq!(def.name, "get_current_time");
        assert!(def.parameters["properties"].as_object().unwrap().is_empty());
    }
}
