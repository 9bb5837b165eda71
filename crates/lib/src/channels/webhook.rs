//! WPPConnect webhook payload (the subset of fields the service reads).

use serde::Deserialize;

/// Webhook POST body. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event: String,
    pub session: String,
    /// Message text, or base64 audio for `ptt` voice notes.
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_new_msg: bool,
    pub sender: WebhookSender,
    pub is_group_msg: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSender {
    pub id: String,
    pub is_user: bool,
}
