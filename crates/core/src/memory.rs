//! Session memory trait: bounded per-session conversation history.
//!
//! A session is created implicitly the first time its id is appended to and
//! holds at most `max_messages` entries, oldest evicted first. There is no
//! expiry. Implementations must serialize operations on the same session id;
//! different ids never contend.

use async_trait::async_trait;
use std::collections::BTreeSet;
use crate::message::{Message, SessionId};

/// Default cap on the number of messages kept per session.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

#[async_trait]
pub trait SessionMemory: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Ordered history, oldest first. Empty for an unknown id.
    async fn get_history(&self, session_id: &SessionId) -> Vec<Message>;

    /// Append exactly one message, then enforce the cap.
    async fn append(&self, session_id: &SessionId, message: Message);

    /// Append several messages as one step, so no reader observes a partial
    /// turn. The cap is enforced once, after all are appended.
    async fn append_all(&self, session_id: &SessionId, messages: Vec<Message>);

    /// Remove all history for the session.
    async fn clear(&self, session_id: &SessionId);

    /// Every session id that currently holds history.
    async fn session_ids(&self) -> BTreeSet<SessionId>;
}
