//! Agent collaborator: invoked with a sender's plain id and the combined burst text.
//!
//! `ChatAgent` keeps one conversation thread per sender and answers through the Ollama client.
//! Turns on one thread run one at a time, so overlapping dispatches for a sender see each
//! other's replies in order.
//!
//! A reply is a single terminal message that may carry tool-call metadata. `ChatAgent` sends
//! no tool definitions, so its replies are direct answers (or empty); tool calls only come
//! from other `Agent` implementations.

use crate::llm::{ChatMessage, ChatModel, OllamaError, ToolCall};
use crate::session::{thread_id, SessionStore};
use async_trait::async_trait;
use std::sync::Arc;

const DEFAULT_MODEL_FALLBACK: &str = "llama3.2:latest";

/// Result of one agent invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AgentReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// True when the agent answered directly: no tool invocation pending and non-blank content.
    pub fn is_direct_answer(&self) -> bool {
        self.tool_calls.is_empty() && !self.content.trim().is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] OllamaError),
    #[error("agent error: {0}")]
    Other(String),
}

/// Stateful per-sender conversation.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, plain_id: &str, text: &str) -> Result<AgentReply, AgentError>;
}

/// Agent backed by an Ollama chat model with in-memory per-sender history.
pub struct ChatAgent {
    client: Arc<dyn ChatModel>,
    model: String,
    system_prompt: Option<String>,
    sessions: SessionStore,
}

impl ChatAgent {
    pub fn new(
        client: Arc<dyn ChatModel>,
        model: Option<&str>,
        system_prompt: Option<String>,
    ) -> Self {
        let model = model.map(str::trim).filter(|m| !m.is_empty());
        let model = match model {
            Some(m) => m.to_string(),
            None => {
                log::warn!("agent: no model configured, using {}", DEFAULT_MODEL_FALLBACK);
                DEFAULT_MODEL_FALLBACK.to_string()
            }
        };
        Self {
            client,
            model,
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
            sessions: SessionStore::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn build_messages(&self, thread: &str) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = self
            .sessions
            .history(thread)
            .await
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
                tool_calls: m.tool_calls,
            })
            .collect();
        if let Some(ref prompt) = self.system_prompt {
            messages.insert(
                0,
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.clone(),
                    tool_calls: None,
                },
            );
        }
        messages
    }
}

#[async_trait]
impl Agent for ChatAgent {
    async fn invoke(&self, plain_id: &str, text: &str) -> Result<AgentReply, AgentError> {
        let thread = thread_id(plain_id);
        let _turn = self.sessions.lock_thread(&thread).await;
        self.sessions.append(&thread, "user", text, None).await;
        let messages = self.build_messages(&thread).await;
        log::debug!("agent: thread {} with {} message(s)", thread, messages.len());

        let res = self.client.chat(&self.model, messages).await?;
        let reply = AgentReply {
            content: res.content().to_string(),
            tool_calls: res.tool_calls().to_vec(),
        };
        let tool_calls = if reply.tool_calls.is_empty() {
            None
        } else {
            Some(reply.tool_calls.clone())
        };
        self.sessions
            .append(&thread, "assistant", reply.content.clone(), tool_calls)
            .await;
        Ok(reply)
    }
}
