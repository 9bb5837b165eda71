//! Messaging channel (WPPConnect).
//!
//! Wire types for the inbound webhook, the normalized inbound message handed to
//! aggregation, and the outbound trait used to answer a sender.

mod inbound;
mod outbound;
mod webhook;
mod wppconnect;

pub use inbound::{InboundMessage, SenderId};
pub use outbound::{ChannelError, OutboundChannel};
pub use webhook::{WebhookPayload, WebhookSender};
pub use wppconnect::WppConnectChannel;
