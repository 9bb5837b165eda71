//! LLM client backing the conversational agent.
//!
//! Lists models and runs non-streaming chat completions against a local Ollama instance.

mod ollama;

pub use ollama::{
    ChatMessage, ChatResponse, OllamaClient, OllamaError, OllamaModel, ToolCall, ToolCallFunction,
};

use async_trait::async_trait;

/// Chat completion backend used by the agent.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatResponse, OllamaError>;
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatResponse, OllamaError> {
        OllamaClient::chat(self, model, messages).await
    }
}
