//! Integration test: serve the gateway router on a free port with fake collaborators,
//! drive /health and /webhook over HTTP, and observe dispatches and replies.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use lib::agent::{Agent, AgentError, AgentReply};
use lib::aggregator::WindowManager;
use lib::channels::{ChannelError, OutboundChannel};
use lib::config::ReplyMode;
use lib::dispatcher::Dispatcher;
use lib::gateway::{self, GatewayState};
use lib::voice::{SpeechSynthesizer, Transcriber};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const WAIT: Duration = Duration::from_millis(300);

#[derive(Default)]
struct RecordingAgent {
    calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Agent for RecordingAgent {
    async fn invoke(&self, plain_id: &str, text: &str) -> Result<AgentReply, AgentError> {
        self.calls
            .lock()
            .await
            .push((plain_id.to_string(), text.to_string()));
        Ok(AgentReply::text(format!("eco: {}", text)))
    }
}

struct EchoTts;

#[async_trait]
impl SpeechSynthesizer for EchoTts {
    async fn synthesize(&self, text: &str, _language: &str) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(text.to_string()))
    }
}

#[derive(Default)]
struct RecordingOutbound {
    voices: Mutex<Vec<(String, Bytes)>>,
}

#[async_trait]
impl OutboundChannel for RecordingOutbound {
    async fn send_text(&self, _plain_id: &str, _text: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_voice(&self, plain_id: &str, audio: Bytes) -> Result<(), ChannelError> {
        self.voices.lock().await.push((plain_id.to_string(), audio));
        Ok(())
    }
}

/// Returns a fixed transcription, or fails when `text` is None.
struct FixedTranscriber {
    text: Option<&'static str>,
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, audio: &Path, _language: Option<&str>) -> anyhow::Result<String> {
        assert!(audio.exists(), "audio file must exist while transcribing");
        match self.text {
            Some(t) => Ok(t.to_string()),
            None => anyhow::bail!("transcription service unavailable"),
        }
    }
}

struct Harness {
    base: String,
    client: reqwest::Client,
    agent: Arc<RecordingAgent>,
    outbound: Arc<RecordingOutbound>,
    windows: WindowManager,
}

async fn start(transcription: Option<&'static str>) -> Harness {
    let agent = Arc::new(RecordingAgent::default());
    let outbound = Arc::new(RecordingOutbound::default());
    let dispatcher = Dispatcher::new(
        agent.clone(),
        Arc::new(EchoTts),
        outbound.clone(),
        ReplyMode::Voice,
        "pt-BR",
        Duration::from_secs(5),
    );
    let windows = WindowManager::new(WAIT, Arc::new(dispatcher));
    let state = GatewayState {
        windows: windows.clone(),
        transcriber: Arc::new(FixedTranscriber {
            text: transcription,
        }),
        language: Some("pt".to_string()),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    let app = gateway::router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Harness {
        base: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        agent,
        outbound,
        windows,
    }
}

impl Harness {
    async fn post(&self, body: &Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}/webhook", self.base))
            .json(body)
            .send()
            .await
            .expect("send webhook");
        let status = resp.status().as_u16();
        (status, resp.json().await.expect("parse JSON"))
    }

    /// Poll until the agent has been called `n` times, or give up after 5s.
    async fn wait_for_calls(&self, n: usize) -> Vec<(String, String)> {
        for _ in 0..100 {
            let calls = self.agent.calls.lock().await.clone();
            if calls.len() >= n {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.agent.calls.lock().await.clone()
    }
}

fn message(sender: &str, kind: &str, body: &str) -> Value {
    json!({
        "event": "onmessage",
        "session": "bot",
        "body": body,
        "type": kind,
        "isNewMsg": true,
        "sender": { "id": sender, "isUser": true },
        "isGroupMsg": false
    })
}

#[tokio::test]
async fn health_reports_healthy() {
    let h = start(None).await;
    let resp = h
        .client
        .get(format!("{}/health", h.base))
        .send()
        .await
        .expect("send health");
    assert!(resp.status().is_success());
    let json: Value = resp.json().await.expect("parse JSON");
    assert_eq!(json, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn burst_is_combined_into_one_agent_call_and_voice_reply() {
    let h = start(None).await;

    let (status, first) = h.post(&message("5511999@c.us", "chat", "Oi")).await;
    assert_eq!(status, 200);
    assert_eq!(first["status"], "aggregating");
    assert_eq!(first["message"], "Message received and being aggregated");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let (status, second) = h.post(&message("5511999@c.us", "chat", "tudo bem?")).await;
    assert_eq!(status, 200);
    assert_eq!(second["status"], "aggregating");
    assert_eq!(second["message"], "Message added to existing aggregation window");

    let calls = h.wait_for_calls(1).await;
    assert_eq!(calls, vec![("5511999".to_string(), "Oi tudo bem?".to_string())]);

    // Give a duplicate dispatch the chance to show up.
    tokio::time::sleep(WAIT * 2).await;
    assert_eq!(h.agent.calls.lock().await.len(), 1);
    let voices = h.outbound.voices.lock().await;
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].0, "5511999");
    assert_eq!(voices[0].1, Bytes::from("eco: Oi tudo bem?"));
    assert_eq!(h.windows.active_windows(), 0);
}

#[tokio::test]
async fn different_senders_are_dispatched_separately() {
    let h = start(None).await;
    h.post(&message("5511111@c.us", "chat", "a1")).await;
    h.post(&message("5522222@c.us", "chat", "b1")).await;
    h.post(&message("5511111@c.us", "chat", "a2")).await;

    let mut calls = h.wait_for_calls(2).await;
    calls.sort();
    assert_eq!(
        calls,
        vec![
            ("5511111".to_string(), "a1 a2".to_string()),
            ("5522222".to_string(), "b1".to_string()),
        ]
    );
}

#[tokio::test]
async fn voice_note_transcription_is_buffered() {
    let h = start(Some("ola")).await;
    let audio = base64::engine::general_purpose::STANDARD.encode(b"OggS voice");
    let (status, ack) = h.post(&message("5511999@c.us", "ptt", &audio)).await;
    assert_eq!(status, 200);
    assert_eq!(ack["status"], "aggregating");

    let calls = h.wait_for_calls(1).await;
    assert_eq!(calls, vec![("5511999".to_string(), "ola".to_string())]);
}

#[tokio::test]
async fn failed_transcription_is_422_and_buffers_nothing() {
    let h = start(None).await;
    let audio = base64::engine::general_purpose::STANDARD.encode(b"OggS voice");
    let (status, body) = h.post(&message("5511999@c.us", "ptt", &audio)).await;
    assert_eq!(status, 422);
    assert!(body["detail"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Error processing audio"));
    assert_eq!(h.windows.pending("5511999@c.us"), 0);
    assert_eq!(h.windows.active_windows(), 0);
}

#[tokio::test]
async fn unsupported_kind_is_received_not_processed() {
    let h = start(None).await;
    let (status, body) = h.post(&message("5511999@c.us", "image", "base64image")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "received");
    assert_eq!(
        body["message"],
        "Message received but not processed (not matching criteria)"
    );
    assert_eq!(h.windows.pending("5511999@c.us"), 0);

    let mut old = message("5511999@c.us", "chat", "Oi");
    old["isNewMsg"] = json!(false);
    let (_, body) = h.post(&old).await;
    assert_eq!(body["status"], "received");
    assert_eq!(h.windows.active_windows(), 0);
}

#[tokio::test]
async fn malformed_payloads_are_422() {
    let h = start(None).await;
    let mut no_sender = message("5511999@c.us", "chat", "Oi");
    no_sender.as_object_mut().expect("object").remove("sender");
    let (status, body) = h.post(&no_sender).await;
    assert_eq!(status, 422);
    assert!(body["detail"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Error parsing message"));

    let resp = h
        .client
        .post(format!("{}/webhook", h.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("send webhook");
    assert_eq!(resp.status().as_u16(), 422);
    assert_eq!(h.windows.active_windows(), 0);
}

#[tokio::test]
async fn closed_windows_yield_500() {
    let h = start(None).await;
    h.windows.close();
    let (status, body) = h.post(&message("5511999@c.us", "chat", "Oi")).await;
    assert_eq!(status, 500);
    assert!(body["detail"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Error processing webhook"));
}
