//! Outbound channel: delivers replies back to a sender.

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
}

/// Sends text and voice replies. `plain_id` is the bare address (phone number),
/// not the platform-qualified id.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    async fn send_text(&self, plain_id: &str, text: &str) -> Result<(), ChannelError>;

    /// Send MP3 audio as a voice note.
    async fn send_voice(&self, plain_id: &str, audio: Bytes) -> Result<(), ChannelError>;
}
