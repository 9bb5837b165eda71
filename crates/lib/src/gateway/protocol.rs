//! Webhook response bodies and HTTP error mapping.

use crate::aggregator::{WindowAction, WindowError};
use crate::ingress::IngressError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Acknowledgment returned for every webhook that was not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
    pub message: String,
}

impl WebhookAck {
    pub fn aggregating(action: WindowAction) -> Self {
        let message = match action {
            WindowAction::Opened => "Message received and being aggregated",
            WindowAction::Joined => "Message added to existing aggregation window",
        };
        Self {
            status: "aggregating".to_string(),
            message: message.to_string(),
        }
    }

    pub fn received() -> Self {
        Self {
            status: "received".to_string(),
            message: "Message received but not processed (not matching criteria)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Failures surfaced to the webhook caller.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Malformed payload or failed voice transcription (422).
    #[error(transparent)]
    Ingress(#[from] IngressError),
    /// Anything else (500).
    #[error("Error processing webhook: {0}")]
    Unexpected(String),
}

impl From<WindowError> for WebhookError {
    fn from(e: WindowError) -> Self {
        WebhookError::Unexpected(e.to_string())
    }
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Ingress(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WebhookError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
