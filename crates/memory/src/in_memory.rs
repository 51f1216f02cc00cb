//! In-memory session store: bounded, per-process conversation history.

use async_trait::async_trait;
use llmcraft_core::memory::{DEFAULT_MAX_MESSAGES, SessionMemory};
use llmcraft_core::message::{Message, SessionId};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type Slot = Arc<Mutex<VecDeque<Message>>>;

/// Session histories held in process memory.
///
/// The outer lock only guards the id → slot map; each slot has its own
/// mutex, so traffic on one session never waits on another.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Slot>>,
    max_messages: usize,
}

impl InMemorySessionStore {
    /// A store keeping at most `max_messages` per session (minimum 1).
    pub fn new(max_messages: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_messages: max_messages.max(1),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    async fn slot(&self, session_id: &SessionId) -> Option<Slot> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn slot_or_create(&self, session_id: &SessionId) -> Slot {
        if let Some(slot) = self.slot(session_id).await {
            return slot;
        }
        self.sessions
            .write()
            .await
            .entry(session_id.clone())
            .or_default()
            .clone()
    }

    fn truncate(&self, history: &mut VecDeque<Message>) {
        while history.len() > self.max_messages {
            history.pop_front();
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

#[async_trait]
impl SessionMemory for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_history(&self, session_id: &SessionId) -> Vec<Message> {
        match self.slot(session_id).await {
            Some(slot) => slot.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    async fn append(&self, session_id: &SessionId, message: Message) {
        self.append_all(session_id, vec![message]).await;
    }

    async fn append_all(&self, session_id: &SessionId, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        let slot = self.slot_or_create(session_id).await;
        let mut history = slot.lock().await;
        history.extend(messages);
        self.truncate(&mut history);
        tracing::trace!(session_id = %session_id, len = history.len(), "Session history updated");
    }

    /// Empties the slot in place. The map entry is only dropped when no
    /// in-flight append holds the slot, so such an append is never orphaned.
    async fn clear(&self, session_id: &SessionId) {
        let mut sessions = self.sessions.write().await;
        let Some(slot) = sessions.get(session_id) else {
            return;
        };
        slot.lock().await.clear();
        if Arc::strong_count(slot) == 1 {
            sessions.remove(session_id);
        }
    }

    async fn session_ids(&self) -> BTreeSet<SessionId> {
        let sessions = self.sessions.read().await;
        let mut ids = BTreeSet::new();
        for (id, slot) in sessions.iter() {
            if !slot.lock().await.is_empty() {
                ids.insert(id.clone());
            }
        }
        ids
    }
}
