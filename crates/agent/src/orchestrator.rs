//! The conversation pipeline.
//!
//! A turn runs `Received → Validated → ContextAssembled → ModelInvoked →
//! [ToolInvoked → ModelInvoked] → MemoryUpdated → Completed`. The guardrail
//! can end it right after `Received`; backend failures end it anywhere after
//! `Validated`. Session memory is only written once a reply exists, and the
//! user and assistant turns are committed together.
//!
//! Turns on the same session id are serialized by a per-session async
//! mutex held from context assembly until the memory commit, so every turn
//! sees a consistent history prefix. Different sessions never contend.

use crate::dispatch::{DispatchedCall, ToolDispatcher};
use crate::retrieval::RetrievalGate;
use crate::stream_event::AgentStreamEvent;
use crate::structured::{
    self, CodeReview, DEFAULT_REVIEW_LANGUAGE, Report, SchemaTag, StructuredOutput,
};
use llmcraft_config::AppConfig;
use llmcraft_core::error::{Error, Result};
use llmcraft_core::memory::SessionMemory;
use llmcraft_core::message::{Message, SessionId};
use llmcraft_core::provider::{Provider, ProviderRequest};
use llmcraft_security::SafetyGuard;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};

const GROUNDING_PREAMBLE: &str = "\n\nUse the following reference material when it is \
relevant to the question. If it does not help, answer from your own knowledge.\n\n";

/// The outcome of a non-streamed chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub reply: String,
    /// Tools executed during the turn, in call order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
}

/// One async mutex per session id.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(session_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the session's lock unless a turn still holds or awaits it.
    /// Waiters clone the `Arc` under the map lock, so the count is exact here.
    fn forget(&self, session_id: &SessionId) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if map
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(session_id);
        }
    }
}

/// Composes guardrail, memory, retrieval, model and tools into one turn.
///
/// Cheap to clone; clones share the same collaborators and session locks.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    memory: Arc<dyn SessionMemory>,
    guard: Arc<SafetyGuard>,
    retrieval: Option<Arc<RetrievalGate>>,
    tools: Option<ToolDispatcher>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    tools_enabled: bool,
    top_k: usize,
    score_threshold: f32,
    locks: Arc<SessionLocks>,
}

impl Orchestrator {
    /// An orchestrator with default settings, no retrieval and no tools.
    pub fn new(provider: Arc<dyn Provider>, memory: Arc<dyn SessionMemory>) -> Self {
        Self::from_config(&AppConfig::default(), provider, memory)
    }

    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        memory: Arc<dyn SessionMemory>,
    ) -> Self {
        Self {
            provider,
            memory,
            guard: Arc::new(SafetyGuard::from_config(&config.guardrail)),
            retrieval: None,
            tools: None,
            model: config.model.chat_model.clone(),
            temperature: config.model.temperature,
            max_tokens: Some(config.model.max_tokens),
            system_prompt: config.agent.system_prompt.clone(),
            tools_enabled: config.agent.tools_enabled,
            top_k: config.retrieval.top_k,
            score_threshold: config.retrieval.score_threshold,
            locks: Arc::default(),
        }
    }

    pub fn with_guard(mut self, guard: SafetyGuard) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    pub fn with_retrieval(mut self, gate: Arc<RetrievalGate>) -> Self {
        self.retrieval = Some(gate);
        self
    }

    pub fn with_tools(mut self, dispatcher: ToolDispatcher) -> Self {
        self.tools = Some(dispatcher);
        self
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retrieval_limits(mut self, top_k: usize, score_threshold: f32) -> Self {
        self.top_k = top_k;
        self.score_threshold = score_threshold;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retrieval_ready(&self) -> bool {
        self.retrieval.as_ref().is_some_and(|g| g.is_initialized())
    }

    pub async fn backend_healthy(&self) -> bool {
        match self.provider.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Health check failed");
                false
            }
        }
    }

    /// Run the guardrail; an unsafe result becomes [`Error::Validation`].
    pub fn validate(&self, text: &str) -> Result<()> {
        let result = self.guard.validate(text);
        if result.safe {
            Ok(())
        } else {
            Err(Error::Validation {
                failures: result.failures,
            })
        }
    }

    fn tools_bound(&self) -> bool {
        self.tools_enabled && self.tools.as_ref().is_some_and(ToolDispatcher::has_tools)
    }

    fn request(&self, messages: Vec<Message>, with_tools: bool, stream: bool) -> ProviderRequest {
        let tools = match (&self.tools, with_tools) {
            (Some(dispatcher), true) => dispatcher.definitions(),
            _ => Vec::new(),
        };
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
            stream,
        }
    }

    /// `[system (+ grounding), history..., user]` for one turn.
    pub async fn assemble_context(
        &self,
        session_id: &SessionId,
        message: &str,
    ) -> Result<Vec<Message>> {
        let history = self.memory.get_history(session_id).await;

        let mut system_prompt = self.system_prompt.clone();
        if let Some(gate) = &self.retrieval {
            let docs = gate
                .retrieve_scored(message, self.top_k, self.score_threshold)
                .await?;
            let grounding = RetrievalGate::format_context(&docs);
            if !grounding.is_empty() {
                system_prompt.push_str(GROUNDING_PREAMBLE);
                system_prompt.push_str(&grounding);
            }
            debug!(session_id = %session_id, documents = docs.len(), "Grounding assembled");
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(history);
        messages.push(Message::user(message));
        debug!(session_id = %session_id, stage = "context_assembled", messages = messages.len());
        Ok(messages)
    }

    /// Append the assistant tool request and the tool results, keeping only
    /// calls that produced a result so every request has an answer.
    fn push_tool_round(messages: &mut Vec<Message>, mut assistant: Message, dispatched: &[DispatchedCall]) {
        if dispatched.is_empty() {
            return;
        }
        assistant.tool_calls = dispatched.iter().map(|d| d.call.clone()).collect();
        messages.push(assistant);
        messages.extend(
            dispatched
                .iter()
                .map(|d| Message::tool_result(&d.call.id, &d.result.output)),
        );
    }

    async fn commit(&self, session_id: &SessionId, user: &str, reply: &str) {
        self.memory
            .append_all(session_id, vec![Message::user(user), Message::assistant(reply)])
            .await;
        debug!(session_id = %session_id, stage = "memory_updated");
    }

    /// Answer one message and record the turn.
    pub async fn chat(&self, message: &str, session_id: &SessionId) -> Result<ChatReply> {
        debug!(session_id = %session_id, stage = "received");
        self.validate(message)?;
        debug!(session_id = %session_id, stage = "validated");

        let _turn = self.locks.acquire(session_id).await;
        let mut messages = self.assemble_context(session_id, message).await?;

        let bind_tools = self.tools_bound();
        debug!(session_id = %session_id, stage = "model_invoked", tools = bind_tools);
        let first = self
            .provider
            .complete(self.request(messages.clone(), bind_tools, false))
            .await?;

        let mut tools_used = Vec::new();
        let reply = match &self.tools {
            Some(dispatcher) if bind_tools && !first.message.tool_calls.is_empty() => {
                let dispatched = dispatcher.dispatch(&first.message.tool_calls).await;
                debug!(session_id = %session_id, stage = "tool_invoked", calls = dispatched.len());
                tools_used = dispatched.iter().map(|d| d.call.name.clone()).collect();
                Self::push_tool_round(&mut messages, first.message, &dispatched);

                debug!(session_id = %session_id, stage = "model_invoked", tools = false);
                let second = self
                    .provider
                    .complete(self.request(messages, false, false))
                    .await?;
                second.message.content
            }
            _ => first.message.content,
        };

        self.commit(session_id, message, &reply).await;
        info!(session_id = %session_id, reply_len = reply.len(), tools = tools_used.len(), "Chat turn completed");

        Ok(ChatReply {
            session_id: session_id.clone(),
            reply,
            tools_used,
        })
    }

    /// Answer one message as a stream of events.
    ///
    /// Validation happens before anything is spawned, so a rejected message
    /// is an `Err` here rather than an `error` event. Once streaming, the
    /// turn ends with exactly one `done` or `error` event. If the receiver
    /// is dropped mid-stream, generation stops and whatever text was
    /// already delivered is committed as the assistant turn.
    pub async fn chat_stream(
        &self,
        message: &str,
        session_id: &SessionId,
    ) -> Result<mpsc::Receiver<AgentStreamEvent>> {
        debug!(session_id = %session_id, stage = "received");
        self.validate(message)?;
        debug!(session_id = %session_id, stage = "validated");

        let (tx, rx) = mpsc::channel(128);
        let this = self.clone();
        let message = message.to_string();
        let session_id = session_id.clone();

        tokio::spawn(async move {
            if let Err(e) = this.run_stream(&message, &session_id, &tx).await {
                warn!(session_id = %session_id, error = %e, stage = "error", "Streamed turn failed");
                let _ = tx
                    .send(AgentStreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });

        Ok(rx)
    }

    async fn run_stream(
        &self,
        message: &str,
        session_id: &SessionId,
        tx: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<()> {
        let _turn = self.locks.acquire(session_id).await;
        let mut messages = self.assemble_context(session_id, message).await?;

        if let Some(dispatcher) = self.tools.as_ref().filter(|_| self.tools_bound()) {
            debug!(session_id = %session_id, stage = "model_invoked", tools = true);
            let first = self
                .provider
                .complete(self.request(messages.clone(), true, false))
                .await?;

            if first.message.tool_calls.is_empty() {
                let reply = first.message.content;
                if !reply.is_empty() {
                    let _ = tx
                        .send(AgentStreamEvent::Chunk {
                            content: reply.clone(),
                        })
                        .await;
                }
                self.commit(session_id, message, &reply).await;
                let _ = tx
                    .send(AgentStreamEvent::Done {
                        session_id: session_id.to_string(),
                    })
                    .await;
                return Ok(());
            }

            let dispatched = dispatcher.dispatch(&first.message.tool_calls).await;
            debug!(session_id = %session_id, stage = "tool_invoked", calls = dispatched.len());
            for d in &dispatched {
                let _ = tx
                    .send(AgentStreamEvent::ToolCall {
                        id: d.call.id.clone(),
                        name: d.call.name.clone(),
                        input: d.input.clone(),
                    })
                    .await;
                let _ = tx
                    .send(AgentStreamEvent::ToolResult {
                        id: d.call.id.clone(),
                        name: d.call.name.clone(),
                        output: d.result.output.clone(),
                        success: d.result.success,
                    })
                    .await;
            }
            Self::push_tool_round(&mut messages, first.message, &dispatched);
        }

        debug!(session_id = %session_id, stage = "model_invoked", stream = true);
        let mut chunks = self
            .provider
            .stream(self.request(messages, false, true))
            .await?;

        let mut reply = String::new();
        let mut disconnected = false;
        loop {
            tokio::select! {
                _ = tx.closed() => {
                    disconnected = true;
                    break;
                }
                next = chunks.recv() => match next {
                    Some(Ok(chunk)) => {
                        if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                            if tx.send(AgentStreamEvent::Chunk { content: text.clone() }).await.is_err() {
                                disconnected = true;
                                break;
                            }
                            reply.push_str(&text);
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        if !reply.is_empty() {
                            self.commit(session_id, message, &reply).await;
                        }
                        return Err(e.into());
                    }
                    None => break,
                },
            }
        }
        // Dropping the receiver stops the provider's producer task.
        drop(chunks);

        if disconnected {
            info!(session_id = %session_id, delivered = reply.len(), "Stream consumer disconnected");
            if !reply.is_empty() {
                self.commit(session_id, message, &reply).await;
            }
            return Ok(());
        }

        self.commit(session_id, message, &reply).await;
        info!(session_id = %session_id, reply_len = reply.len(), "Streamed turn completed");
        let _ = tx
            .send(AgentStreamEvent::Done {
                session_id: session_id.to_string(),
            })
            .await;
        Ok(())
    }

    async fn complete_text(&self, messages: Vec<Message>) -> Result<String> {
        let response = self.provider.complete(self.request(messages, false, false)).await?;
        Ok(response.message.content)
    }

    /// Ask for a technical report on `topic`. The topic passes the guardrail.
    pub async fn generate_report(&self, topic: &str) -> Result<Report> {
        self.validate(topic)?;
        let raw = self.complete_text(structured::report_messages(topic)).await?;
        let report = structured::extract::<Report>(&raw)?;
        info!(topic, sections = report.sections.len(), "Report generated");
        Ok(report)
    }

    /// Review `code`. Code is not screened by the guardrail: it is data,
    /// and routinely trips the length and pattern checks.
    pub async fn review_code(&self, code: &str, language: Option<&str>) -> Result<CodeReview> {
        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_REVIEW_LANGUAGE);
        let raw = self
            .complete_text(structured::review_messages(code, language))
            .await?;
        let review = structured::extract::<CodeReview>(&raw)?;
        info!(language, score = review.score, "Code review generated");
        Ok(review)
    }

    pub async fn structured(
        &self,
        schema: SchemaTag,
        input: &str,
        language: Option<&str>,
    ) -> Result<StructuredOutput> {
        Ok(match schema {
            SchemaTag::Report => StructuredOutput::Report(self.generate_report(input).await?),
            SchemaTag::CodeReview => {
                StructuredOutput::CodeReview(self.review_code(input, language).await?)
            }
        })
    }

    pub async fn sessions(&self) -> Vec<SessionId> {
        self.memory.session_ids().await.into_iter().collect()
    }

    pub async fn history(&self, session_id: &SessionId) -> Vec<Message> {
        self.memory.get_history(session_id).await
    }

    /// Forget a session. Waits for any in-flight turn on it to finish.
    pub async fn clear(&self, session_id: &SessionId) {
        {
            let _turn = self.locks.acquire(session_id).await;
            self.memory.clear(session_id).await;
        }
        self.locks.forget(session_id);
        info!(session_id = %session_id, "Session cleared");
    }
}
