//! OpenAI-compatible chat model client.
//!
//! Ollama exposes this API under `/v1`, which is what llmcraft talks to by
//! default; vLLM, llama.cpp server and hosted OpenAI-style endpoints work the
//! same way.
//!
//! Supports:
//! - Chat completions, plain and with bound tools
//! - Streaming completions over SSE
//! - Embeddings (`/embeddings`)

use async_trait::async_trait;
use futures::StreamExt;
use llmcraft_core::error::ProviderError;
use llmcraft_core::message::{Message, MessageToolCall};
use llmcraft_core::provider::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A chat model reachable through an OpenAI-compatible HTTP API.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// A local Ollama server (no key needed).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"), None)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// The JSON body shared by streaming and non-streaming completions.
    fn chat_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.tools));
        }
        body
    }
}

/// Map non-success statuses to provider errors, consuming the body for context.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        429 => Err(ProviderError::RateLimited { retry_after_secs: 5 }),
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "Model endpoint returned error");
            Err(ProviderError::ApiError { status_code: status, message })
        }
    }
}

fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: m.role.as_str().to_string(),
            content: Some(m.content.clone()),
            tool_calls: (!m.tool_calls.is_empty()).then(|| {
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .post("/chat/completions")
            .json(&Self::chat_body(&request, false))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let mut message = Message::assistant(choice.message.content.unwrap_or_default());
        message.tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            message,
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .post("/chat/completions")
            .header("Accept", "text/event-stream")
            .json(&Self::chat_body(&request, true))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // The task owns the HTTP body; returning drops it and closes the
        // connection, which is how a departed consumer stops generation.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(next) = byte_stream.next().await {
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for chunk in decoder.feed(&bytes, &provider_name) {
                    let done = chunk.done;
                    if tx.send(Ok(chunk)).await.is_err() {
                        debug!(provider = %provider_name, "Stream consumer went away");
                        return;
                    }
                    if done {
                        return;
                    }
                }
            }

            // Body ended without [DONE].
            let _ = tx.send(Ok(decoder.finish())).await;
        });

        Ok(rx)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        let response = self
            .post("/embeddings")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let mut api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        if api_resp.data.len() != request.inputs.len() {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: format!(
                    "expected {} embeddings, got {}",
                    request.inputs.len(),
                    api_resp.data.len()
                ),
            });
        }
        api_resp.data.sort_by_key(|d| d.index);

        Ok(EmbeddingResponse {
            embeddings: api_resp.data.into_iter().map(|d| d.embedding).collect(),
            model: api_resp.model,
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let mut builder = self.client.get(format!("{}/models", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

/// Incremental decoder for an OpenAI-style SSE completion stream.
///
/// Bytes arrive in arbitrary splits (possibly inside a multi-byte
/// character), so partial lines are buffered as raw bytes until their
/// newline shows up. Tool call fragments are accumulated by index and
/// delivered together on the final (`done`) chunk.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<u32, MessageToolCall>,
    finished: bool,
}

impl SseDecoder {
    fn feed(&mut self, bytes: &[u8], provider: &str) -> Vec<StreamChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while !self.finished {
            let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };
            if data == "[DONE]" {
                out.push(self.finish());
                break;
            }

            let parsed = match serde_json::from_str::<StreamResponse>(data) {
                Ok(p) => p,
                Err(e) => {
                    trace!(provider, data, error = %e, "Ignoring unparseable SSE chunk");
                    continue;
                }
            };

            if let Some(choice) = parsed.choices.into_iter().next() {
                for delta in choice.delta.tool_calls.unwrap_or_default() {
                    let acc = self.tool_calls.entry(delta.index).or_insert_with(|| MessageToolCall {
                        id: String::new(),
                        name: String::new(),
                        arguments: String::new(),
                    });
                    if let Some(id) = delta.id {
                        acc.id = id;
                    }
                    if let Some(func) = delta.function {
                        if let Some(name) = func.name {
                            acc.name = name;
                        }
                        if let Some(args) = func.arguments {
                            acc.arguments.push_str(&args);
                        }
                    }
                }
                if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                    out.push(StreamChunk {
                        content: Some(content),
                        ..StreamChunk::default()
                    });
                }
            }

            // With `include_usage` the usage record is the last payload.
            if let Some(usage) = parsed.usage {
                let mut last = self.finish();
                last.usage = Some(usage.into());
                out.push(last);
            }
        }

        out
    }

    /// The terminal chunk, carrying any assembled tool calls.
    fn finish(&mut self) -> StreamChunk {
        self.finished = true;
        StreamChunk {
            content: None,
            tool_calls: std::mem::take(&mut self.tool_calls).into_values().collect(),
            done: true,
            usage: None,
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(chunks: &[StreamChunk]) -> String {
        chunks.iter().filter_map(|c| c.content.as_deref()).collect()
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url(), "http://localhost:11434/v1");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("x", "http://host:1/v1/", None).unwrap();
        assert_eq!(provider.base_url(), "http://host:1/v1");
    }

    #[test]
    fn message_conversion_keeps_roles_and_correlation() {
        let mut assistant = Message::assistant("");
        assistant.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "calculate".into(),
            arguments: r#"{"expression":"2+2"}"#.into(),
        }];
        let messages = vec![
            Message::system("You are Raina"),
            Message::user("2+2?"),
            assistant,
            Message::tool_result("call_1", "2+2 = 4"),
        ];
        let api = to_api_messages(&messages);
        let roles: Vec<_> = api.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "tool"]);
        assert_eq!(api[2].tool_calls.as_ref().unwrap()[0].function.name, "calculate");
        assert_eq!(api[3].tool_call_id.as_deref(), Some("call_1"));
        assert!(api[1].tool_calls.is_none());
    }

    #[test]
    fn chat_body_binds_tools_only_when_present() {
        let mut request = ProviderRequest {
            model: "glm-5:cloud".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.7,
            max_tokens: Some(256),
            tools: vec![],
            stream: false,
        };
        let body = OpenAiCompatProvider::chat_body(&request, false);
        assert!(body.get("tools").is_none());
        assert_eq!(body["max_tokens"], 256);

        request.tools.push(ToolDefinition {
            name: "get_current_time".into(),
            description: "Current local time".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        });
        let body = OpenAiCompatProvider::chat_body(&request, true);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_current_time");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        let mut chunks = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel", "t");
        assert!(chunks.is_empty());
        chunks.extend(decoder.feed(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n", "t"));
        chunks.extend(decoder.feed(b"data: [DONE]\n", "t"));

        assert_eq!(contents(&chunks), "Hello world");
        assert!(chunks.last().unwrap().done);
    }

    #[test]
    fn decoder_skips_comments_and_garbage() {
        let mut decoder = SseDecoder::default();
        let chunks = decoder.feed(
            b": keep-alive\r\ndata: not-json\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n",
            "t",
        );
        assert_eq!(contents(&chunks), "ok");
        assert!(!chunks.iter().any(|c| c.done));
    }

    #[test]
    fn decoder_assembles_tool_calls_in_index_order() {
        let mut decoder = SseDecoder::default();
        let stream = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"id\":\"call_b\",\"function\":{\"name\":\"get_current_time\",\"arguments\":\"{}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"calculate\",\"arguments\":\"{\\\"expression\\\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\":\\\"2+2\\\"}\"}}]}}]}\n",
            "data: [DONE]\n",
        );
        let chunks = decoder.feed(stream.as_bytes(), "t");
        let last = chunks.last().unwrap();
        assert!(last.done);
        assert_eq!(last.tool_calls.len(), 2);
        assert_eq!(last.tool_calls[0].id, "call_a");
        assert_eq!(last.tool_calls[0].arguments, r#"{"expression":"2+2"}"#);
        assert_eq!(last.tool_calls[1].name, "get_current_time");
    }

    #[test]
    fn decoder_usage_terminates_stream() {
        let mut decoder = SseDecoder::default();
        let chunks = decoder.feed(
            concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
                "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
            )
            .as_bytes(),
            "t",
        );
        assert_eq!(contents(&chunks), "a");
        let last = chunks.last().unwrap();
        assert!(last.done);
        assert_eq!(last.usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_embedding_response_out_of_order() {
        let data = r#"{
            "data": [
                {"embedding": [0.4, 0.5], "index": 1},
                {"embedding": [0.1, 0.2], "index": 0}
            ],
            "model": "embeddinggemma"
        }"#;
        let mut parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
        assert_eq!(parsed.model, "embeddinggemma");
    }
}
