//! Gateway: HTTP surface of the service.
//!
//! `POST /webhook` receives WPPConnect events, `GET /health` is the liveness probe.
//! Accepted messages are buffered in aggregation windows; replies go out asynchronously.

mod protocol;
mod server;

pub use protocol::{ErrorBody, WebhookAck, WebhookError};
pub use server::{build_state, router, run_gateway, GatewayState};
