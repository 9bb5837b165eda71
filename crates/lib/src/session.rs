//! Conversation history per sender thread.
//!
//! Threads are keyed by a deterministic id derived from the sender's plain identifier,
//! so the same sender always continues the same conversation while the process lives.
//! Each thread keeps at most `MAX_HISTORY` messages; older ones are dropped first.

use crate::llm::ToolCall;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Messages kept per thread.
pub const MAX_HISTORY: usize = 40;

/// Unique thread identifier (opaque string).
pub type ThreadId = String;

/// Deterministic thread id for a sender: UUIDv5 of `thread-<plain_id>` in the DNS namespace.
pub fn thread_id(plain_id: &str) -> ThreadId {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, format!("thread-{}", plain_id).as_bytes()).to_string()
}

/// A single message in a thread; assistant messages may carry tool calls.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub role: String,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// In-memory store for conversation threads.
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<ThreadId, Vec<ThreadMessage>>>>,
    turns: Arc<Mutex<HashMap<ThreadId, Arc<Mutex<()>>>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            turns: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append a message, creating the thread on first use.
    pub async fn append(
        &self,
        id: &str,
        role: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Option<Vec<ToolCall>>,
    ) {
        let mut g = self.inner.write().await;
        let thread = g.entry(id.to_string()).or_default();
        thread.push(ThreadMessage {
            role: role.into(),
            content: content.into(),
            tool_calls,
        });
        if thread.len() > MAX_HISTORY {
            let excess = thread.len() - MAX_HISTORY;
            thread.drain(..excess);
        }
    }

    /// Exclusive turn on a thread. Held for a whole exchange so turns on one thread
    /// do not interleave; other threads are unaffected.
    pub async fn lock_thread(&self, id: &str) -> OwnedMutexGuard<()> {
        let turn = self
            .turns
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone();
        turn.lock_owned().await
    }

    /// Clone of the thread's history; empty when the thread does not exist.
    pub async fn history(&self, id: &str) -> Vec<ThreadMessage> {
        self.inner.read().await.get(id).cloned().unwrap_or_default()
    }
}
