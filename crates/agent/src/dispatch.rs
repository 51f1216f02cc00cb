//! Tool dispatch: executes the tool calls from one model turn.

use llmcraft_config::UnknownToolPolicy;
use llmcraft_core::error::ToolError;
use llmcraft_core::message::MessageToolCall;
use llmcraft_core::tool::{ToolCall, ToolRegistry, ToolResult};
use llmcraft_core::ToolDefinition;
use std::sync::Arc;
use tracing::{debug, warn};

/// One executed call: the (id-normalized) request and what came back.
#[derive(Debug, Clone)]
pub struct DispatchedCall {
    pub call: MessageToolCall,
    pub input: serde_json::Value,
    pub result: ToolResult,
}

#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    policy: UnknownToolPolicy,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            policy: UnknownToolPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: UnknownToolPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Run every call in order. Tool failures become error text for the
    /// model rather than errors for the caller. Unknown tools are skipped
    /// or answered depending on the policy.
    pub async fn dispatch(&self, calls: &[MessageToolCall]) -> Vec<DispatchedCall> {
        let mut dispatched = Vec::with_capacity(calls.len());

        for (i, raw) in calls.iter().enumerate() {
            let mut call = raw.clone();
            if call.id.is_empty() {
                call.id = format!("call_{i}");
            }

            if self.registry.get(&call.name).is_none() {
                match self.policy {
                    UnknownToolPolicy::Skip => {
                        warn!(tool = %call.name, "Model requested unknown tool, skipping");
                        continue;
                    }
                    UnknownToolPolicy::Report => {
                        warn!(tool = %call.name, "Model requested unknown tool, reporting");
                        let result = ToolResult::failed(
                            &call.name,
                            format!("[error]: unknown tool '{}'", call.name),
                        )
                        .for_call(&call.id);
                        dispatched.push(DispatchedCall {
                            input: serde_json::Value::Null,
                            call,
                            result,
                        });
                        continue;
                    }
                }
            }

            let input = match parse_arguments(&call.arguments) {
                Ok(input) => input,
                Err(reason) => {
                    let result = ToolResult::failed(&call.name, format!("[error]: invalid arguments: {reason}"))
                        .for_call(&call.id);
                    dispatched.push(DispatchedCall {
                        input: serde_json::Value::Null,
                        call,
                        result,
                    });
                    continue;
                }
            };

            let request = ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: input.clone(),
            };
            let result = match self.registry.execute(&request).await {
                Ok(result) => result,
                Err(e) => failure_result(&call, &e),
            };
            debug!(tool = %call.name, success = result.success, "Tool executed");

            dispatched.push(DispatchedCall { call, input, result });
        }

        dispatched
    }
}

fn parse_arguments(raw: &str) -> Result<serde_json::Value, String> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

fn failure_result(call: &MessageToolCall, error: &ToolError) -> ToolResult {
    ToolResult::failed(&call.name, format!("[error]: {error}")).for_call(&call.id)
}
