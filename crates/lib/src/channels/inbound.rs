//! Inbound message from the channel: delivered to the aggregation windows.

use chrono::{DateTime, Utc};

/// Platform-qualified participant id (e.g. `5511999@c.us`). Sole partition key for buffering.
pub type SenderId = String;

/// A normalized message accepted by ingress. For voice notes, `text` is the transcription.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_id: SenderId,
    pub session: String,
    pub text: String,
    pub is_user: bool,
    pub is_group: bool,
    pub received_at: DateTime<Utc>,
}
