//! Dispatch a closed window: combine texts, call the agent, deliver a direct answer.

use crate::agent::{Agent, AgentError, AgentReply};
use crate::aggregator::{ClosedWindow, WindowSink};
use crate::channels::{ChannelError, OutboundChannel, SenderId};
use crate::config::ReplyMode;
use crate::voice::SpeechSynthesizer;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Separator between the bare address and the platform suffix in a sender id (`5511999@c.us`).
pub const PLAIN_ID_DELIMITER: char = '@';

/// Outcome of one dispatched window.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub sender_id: SenderId,
    pub combined_text: String,
    pub session: String,
    pub is_user: bool,
    pub is_group: bool,
    pub agent_reply: AgentReply,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("agent did not reply within {0:?}")]
    Timeout(Duration),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error(transparent)]
    Outbound(#[from] ChannelError),
}

/// Bare address of a sender: the part before the first `@`, or the whole id when there is none.
pub fn plain_id(sender_id: &str) -> &str {
    sender_id
        .split_once(PLAIN_ID_DELIMITER)
        .map_or(sender_id, |(plain, _)| plain)
}

/// Calls the agent for each closed window and sends the answer back.
pub struct Dispatcher {
    agent: Arc<dyn Agent>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    outbound: Arc<dyn OutboundChannel>,
    reply_mode: ReplyMode,
    /// BCP-47 code for synthesized replies.
    voice_language: String,
    agent_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        agent: Arc<dyn Agent>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        outbound: Arc<dyn OutboundChannel>,
        reply_mode: ReplyMode,
        voice_language: impl Into<String>,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            agent,
            synthesizer,
            outbound,
            reply_mode,
            voice_language: voice_language.into(),
            agent_timeout,
        }
    }

    pub async fn dispatch(&self, window: ClosedWindow) -> Result<DispatchResult, DispatchError> {
        let combined_text = window.combined_text();
        let phone = plain_id(&window.sender_id);
        log::info!(
            "processing aggregated messages for {}: {}",
            window.sender_id,
            combined_text
        );

        let invocation = self.agent.invoke(phone, &combined_text);
        let reply = tokio::time::timeout(self.agent_timeout, invocation)
            .await
            .map_err(|_| DispatchError::Timeout(self.agent_timeout))??;
        log::info!("agent response for {}: {:?}", window.sender_id, reply.content);

        if reply.is_direct_answer() {
            self.deliver(phone, &reply.content).await?;
        } else if let Some(call) = reply.tool_calls.first() {
            log::info!(
                "agent for {} is calling tool {} with {}; no reply sent",
                window.sender_id,
                call.function.name,
                call.function.arguments
            );
        } else {
            log::debug!("agent returned an empty reply for {}", window.sender_id);
        }

        Ok(DispatchResult {
            sender_id: window.sender_id,
            combined_text,
            session: window.session,
            is_user: window.is_user,
            is_group: window.is_group,
            agent_reply: reply,
        })
    }

    async fn deliver(&self, phone: &str, answer: &str) -> Result<(), DispatchError> {
        if self.reply_mode.sends_text() {
            self.outbound.send_text(phone, answer).await?;
        }
        if self.reply_mode.sends_voice() {
            let audio = self
                .synthesizer
                .synthesize(answer, &self.voice_language)
                .await
                .map_err(|e| DispatchError::Synthesis(e.to_string()))?;
            self.outbound.send_voice(phone, audio).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WindowSink for Dispatcher {
    async fn window_closed(&self, window: ClosedWindow) -> Result<(), DispatchError> {
        self.dispatch(window).await.map(|_| ())
    }
}
