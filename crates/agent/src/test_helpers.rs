//! Shared test doubles for the orchestration pipeline.

use async_trait::async_trait;
use llmcraft_core::error::{MemoryError, ProviderError};
use llmcraft_core::message::{Message, MessageToolCall};
use llmcraft_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use llmcraft_core::retrieval::{DocumentChunk, ScoredChunk, VectorStore};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A scripted stream: chunks sent in order, then optionally held open until
/// the consumer hangs up.
pub struct StreamScript {
    pub chunks: Vec<Result<StreamChunk, ProviderError>>,
    pub hold_open: bool,
}

impl StreamScript {
    pub fn text(parts: &[&str]) -> Self {
        let mut chunks: Vec<_> = parts
            .iter()
            .map(|p| {
                Ok(StreamChunk {
                    content: Some((*p).to_string()),
                    ..Default::default()
                })
            })
            .collect();
        chunks.push(Ok(StreamChunk {
            done: true,
            ..Default::default()
        }));
        Self {
            chunks,
            hold_open: false,
        }
    }
}

/// A provider that replays scripted responses and records every request.
///
/// `complete` pops the next queued response and panics when the queue is
/// empty. `stream` pops the next stream script, falling back to wrapping
/// `complete` when no script is queued.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    streams: Mutex<VecDeque<StreamScript>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        self.streams.lock().unwrap().push_back(script);
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.expect("ScriptedProvider: no more responses"))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let script = self.streams.lock().unwrap().pop_front();
        let Some(script) = script else {
            let response = self.complete(request).await?;
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(response.message.content),
                    done: true,
                    ..Default::default()
                }))
                .await;
            return Ok(rx);
        };

        self.requests.lock().unwrap().push(request);
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            for chunk in script.chunks {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            if script.hold_open {
                tx.closed().await;
            }
        });
        Ok(rx)
    }
}

/// Blocks every `complete` until the test releases a permit, tracking how
/// many calls were in flight at once.
pub struct GatedProvider {
    gate: tokio::sync::Semaphore,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl GatedProvider {
    pub fn new() -> Self {
        Self {
            gate: tokio::sync::Semaphore::new(0),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.gate.acquire().await.unwrap().forget();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(make_text_response("ok"))
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut response = make_text_response("");
    response.message.tool_calls = tool_calls;
    response
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A vector store with fixed search hits. It counts as initialized once it
/// has hits or has been given documents.
#[derive(Default)]
pub struct FixedDistanceStore {
    hits: Vec<ScoredChunk>,
    added: Mutex<Vec<DocumentChunk>>,
}

impl FixedDistanceStore {
    pub fn new(hits: Vec<(&str, f32)>) -> Self {
        Self {
            hits: hits
                .into_iter()
                .map(|(source, distance)| ScoredChunk {
                    content: format!("content of {source}"),
                    source: source.into(),
                    distance,
                })
                .collect(),
            added: Mutex::default(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn added(&self) -> Vec<DocumentChunk> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for FixedDistanceStore {
    async fn add_documents(&self, chunks: Vec<DocumentChunk>) -> Result<usize, MemoryError> {
        let count = chunks.len();
        self.added.lock().unwrap().extend(chunks);
        Ok(count)
    }

    async fn similarity_search_with_distance(
        &self,
        _query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, MemoryError> {
        Ok(self.hits.iter().take(k).cloned().collect())
    }

    fn is_initialized(&self) -> bool {
        !self.hits.is_empty() || !self.added.lock().unwrap().is_empty()
    }
}
