//! Gateway HTTP server.

use crate::agent::ChatAgent;
use crate::aggregator::WindowManager;
use crate::channels::WppConnectChannel;
use crate::config::{self, Config};
use crate::dispatcher::Dispatcher;
use crate::gateway::protocol::{WebhookAck, WebhookError};
use crate::ingress::{self, IngressError, Normalized};
use crate::llm::OllamaClient;
use crate::voice::{GoogleTts, GroqTranscriber, Transcriber};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub windows: WindowManager,
    pub transcriber: Arc<dyn Transcriber>,
    /// Language hint for voice-note transcription.
    pub language: Option<String>,
}

/// Wire the collaborators described by `config` into the aggregation windows and handler state.
pub fn build_state(config: &Config, ollama: OllamaClient) -> Result<GatewayState> {
    let wait = config::resolve_wait_time(config)?;
    let agent_timeout = config::resolve_agent_timeout(config)?;

    let groq_key = config::resolve_groq_api_key(config);
    if groq_key.is_none() {
        log::warn!("GROQ_API_KEY not set; voice notes will be rejected");
    }
    let google_key = config::resolve_google_api_key(config);
    if google_key.is_none() && config.reply.mode.sends_voice() {
        log::warn!("GOOGLE_API_KEY not set; voice replies will fail");
    }
    if config.wppconnect.session.is_none() {
        log::warn!("wppconnect.session not set; replies cannot be delivered");
    }

    let agent = ChatAgent::new(
        Arc::new(ollama),
        config.agent.model.as_deref(),
        config.agent.system_prompt.clone(),
    );
    log::info!("agent model: {}", agent.model());
    let outbound = WppConnectChannel::new(
        &config.wppconnect.base_url,
        config.wppconnect.session.clone(),
        config::resolve_wppconnect_token(config),
    );
    let dispatcher = Dispatcher::new(
        Arc::new(agent),
        Arc::new(GoogleTts::new(google_key, config.voice.tts_voice.clone())),
        Arc::new(outbound),
        config.reply.mode,
        config.voice.tts_language_code.clone(),
        agent_timeout,
    );
    let transcriber = GroqTranscriber::new(groq_key, config.voice.transcription_model.clone());

    Ok(GatewayState {
        windows: WindowManager::new(wait, Arc::new(dispatcher)),
        transcriber: Arc::new(transcriber),
        language: config::resolve_language(config),
    })
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health_http))
        .with_state(state)
}

/// Run the gateway server on config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let ollama = OllamaClient::new(config.agent.ollama_base_url.clone());
    let state = build_state(&config, ollama.clone())?;
    log::info!(
        "aggregation window: {}s",
        state.windows.wait_time().as_secs_f32()
    );

    {
        let model = config.agent.model.clone();
        tokio::spawn(async move {
            match ollama.list_models().await {
                Ok(list) => {
                    log::info!("ollama model discovery completed ({} models)", list.len());
                    if let Some(m) = model {
                        if !list.iter().any(|x| x.name == m) {
                            log::warn!("configured model {} not found in ollama", m);
                        }
                    }
                }
                Err(e) => {
                    log::debug!("ollama model discovery failed: {}", e);
                }
            }
        });
    }

    let windows = state.windows.clone();
    let app = router(state);
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("webhook service listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(windows))
        .await
        .context("gateway server exited")?;
    log::info!("webhook service stopped");
    Ok(())
}

/// Future that completes on SIGINT or SIGTERM. Pending windows are dropped, not dispatched.
async fn shutdown_signal(windows: WindowManager) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");

    let dropped = windows.close();
    if dropped > 0 {
        log::warn!("dropping {} pending aggregation window(s)", dropped);
    }
}

/// POST /webhook — filter, normalize and buffer one WPPConnect event.
async fn webhook(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let request_id = chrono::Local::now().format("%Y%m%d%H%M%S%6f").to_string();
    log::info!("received webhook request - id: {}", request_id);

    let raw: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        log::error!("request {} - invalid json: {}", request_id, e);
        IngressError::Payload(e.to_string())
    })?;

    let normalized = ingress::normalize(
        raw,
        state.transcriber.as_ref(),
        state.language.as_deref(),
    )
    .await;
    let msg = match normalized {
        Ok(Normalized::Accepted(msg)) => msg,
        Ok(Normalized::Skipped) => {
            log::info!(
                "request {} - message skipped (does not match criteria)",
                request_id
            );
            return Ok(Json(WebhookAck::received()));
        }
        Err(e) => {
            log::error!("request {} - {}", request_id, e);
            return Err(e.into());
        }
    };

    let sender = msg.sender_id.clone();
    let action = state.windows.enqueue(msg).map_err(|e| {
        log::error!("request {} - unexpected error: {}", request_id, e);
        WebhookError::from(e)
    })?;
    log::info!("request {} - {} buffered ({:?})", request_id, sender, action);
    Ok(Json(WebhookAck::aggregating(action)))
}

/// GET /health — liveness probe.
async fn health_http() -> Json<serde_json::Value> {
    log::debug!("health check requested");
    Json(json!({ "status": "healthy" }))
}
