//! WPPConnect channel: send-message and send-voice-base64 via the WPPConnect server REST API.

use crate::channels::outbound::{ChannelError, OutboundChannel};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;

/// WPPConnect connector for replies. One instance per WPPConnect session.
pub struct WppConnectChannel {
    base_url: String,
    session: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
}

impl WppConnectChannel {
    pub fn new(base_url: &str, session: Option<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            token,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, action: &str) -> Result<String, ChannelError> {
        let session = self
            .session
            .as_deref()
            .ok_or(ChannelError::NotConfigured("wppconnect session"))?;
        Ok(format!("{}/api/{}/{}", self.base_url, session, action))
    }

    async fn post(&self, action: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let url = self.endpoint(action)?;
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("{} failed: {} {}", action, status, body)));
        }
        Ok(())
    }
}

/// `data:` URL wrapping MP3 audio, as expected by send-voice-base64.
fn voice_data_url(audio: &[u8]) -> String {
    format!(
        "data:audio/mpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(audio)
    )
}

#[async_trait]
impl OutboundChannel for WppConnectChannel {
    async fn send_text(&self, plain_id: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "phone": plain_id, "isGroup": false, "message": text });
        self.post("send-message", body).await
    }

    async fn send_voice(&self, plain_id: &str, audio: Bytes) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "phone": plain_id,
            "isGroup": false,
            "base64Ptt": voice_data_url(&audio),
        });
        self.post("send-voice-base64", body).await
    }
}
