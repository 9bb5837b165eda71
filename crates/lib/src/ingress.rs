//! Webhook ingress: filters raw webhook JSON and normalizes accepted events into `InboundMessage`.
//!
//! Voice notes (`ptt`) carry base64 audio in `body`; it is decoded into a temporary `.ogg`
//! file, transcribed, and the transcription replaces the body. The temporary file is removed
//! when it goes out of scope, whatever the outcome.

use crate::channels::{InboundMessage, WebhookPayload};
use crate::voice::Transcriber;
use base64::Engine;
use serde_json::Value;

/// Message kinds that are aggregated and dispatched.
pub const ACCEPTED_KINDS: [&str; 3] = ["chat", "list_response", "ptt"];

const VOICE_NOTE_KIND: &str = "ptt";

/// Outcome of normalizing one webhook delivery.
#[derive(Debug)]
pub enum Normalized {
    Accepted(InboundMessage),
    /// Event filtered out (wrong event, not new, or unsupported kind). Acknowledged, not processed.
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("Error parsing message: {0}")]
    Payload(String),
    #[error("Error processing audio: {0}")]
    Transcription(String),
}

/// True when the raw event is a new message of an accepted kind.
pub fn matches_criteria(raw: &Value) -> bool {
    raw.get("event").and_then(Value::as_str) == Some("onmessage")
        && raw.get("isNewMsg").and_then(Value::as_bool) == Some(true)
        && raw
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| ACCEPTED_KINDS.contains(&kind))
}

/// Filter and normalize a raw webhook body. Filtering happens before field validation,
/// so an unrelated event with an unexpected shape is skipped rather than rejected.
pub async fn normalize(
    raw: Value,
    transcriber: &dyn Transcriber,
    language: Option<&str>,
) -> Result<Normalized, IngressError> {
    if !matches_criteria(&raw) {
        return Ok(Normalized::Skipped);
    }
    let payload: WebhookPayload =
        serde_json::from_value(raw).map_err(|e| IngressError::Payload(e.to_string()))?;
    if payload.sender.id.trim().is_empty() {
        return Err(IngressError::Payload("empty sender id".to_string()));
    }

    let text = if payload.kind == VOICE_NOTE_KIND {
        transcribe_voice_note(&payload.body, transcriber, language).await?
    } else {
        payload.body
    };

    Ok(Normalized::Accepted(InboundMessage {
        sender_id: payload.sender.id,
        session: payload.session,
        text,
        is_user: payload.sender.is_user,
        is_group: payload.is_group_msg,
        received_at: chrono::Utc::now(),
    }))
}

/// Decode base64 audio (optionally wrapped in a `data:` URL).
fn decode_audio(body: &str) -> Result<Vec<u8>, IngressError> {
    let encoded = match body.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => body,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| IngressError::Transcription(format!("invalid base64 audio: {}", e)))
}

async fn transcribe_voice_note(
    body: &str,
    transcriber: &dyn Transcriber,
    language: Option<&str>,
) -> Result<String, IngressError> {
    let audio = decode_audio(body)?;
    let file = tempfile::Builder::new()
        .prefix("voice-")
        .suffix(".ogg")
        .tempfile()
        .map_err(|e| IngressError::Transcription(format!("creating temp file: {}", e)))?;
    tokio::fs::write(file.path(), &audio)
        .await
        .map_err(|e| IngressError::Transcription(format!("writing temp file: {}", e)))?;
    transcriber
        .transcribe(file.path(), language)
        .await
        .map_err(|e| IngressError::Transcription(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Records the audio path and language it was called with.
    struct FakeTranscriber {
        reply: Result<String, String>,
        seen: Mutex<Vec<(PathBuf, Vec<u8>, Option<String>)>>,
    }

    impl FakeTranscriber {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(msg: &str) -> Self {
            Self {
                reply: Err(msg.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen_paths(&self) -> Vec<PathBuf> {
            self.seen.lock().unwrap().iter().map(|s| s.0.clone()).collect()
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, audio: &Path, language: Option<&str>) -> anyhow::Result<String> {
            let bytes = std::fs::read(audio)?;
            self.seen.lock().unwrap().push((
                audio.to_path_buf(),
                bytes,
                language.map(str::to_string),
            ));
            self.reply.clone().map_err(anyhow::Error::msg)
        }
    }

    fn payload(kind: &str, body: &str) -> Value {
        json!({
            "event": "onmessage",
            "session": "bot",
            "body": body,
            "type": kind,
            "isNewMsg": true,
            "sender": { "id": "5511999@c.us", "isUser": true },
            "isGroupMsg": false
        })
    }

    #[tokio::test]
    async fn chat_body_is_used_verbatim() {
        let stt = FakeTranscriber::ok("unused");
        let res = normalize(payload("chat", "Oi"), &stt, None).await.unwrap();
        let Normalized::Accepted(msg) = res else {
            panic!("expected accepted");
        };
        assert_eq!(msg.text, "Oi");
        assert_eq!(msg.sender_id, "5511999@c.us");
        assert_eq!(msg.session, "bot");
        assert!(msg.is_user);
        assert!(!msg.is_group);
        assert!(stt.seen_paths().is_empty());
    }

    #[tokio::test]
    async fn list_response_is_accepted() {
        let stt = FakeTranscriber::ok("unused");
        let res = normalize(payload("list_response", "Opção 2"), &stt, None)
            .await
            .unwrap();
        assert!(matches!(res, Normalized::Accepted(m) if m.text == "Opção 2"));
    }

    #[tokio::test]
    async fn voice_note_is_transcribed_and_temp_file_removed() {
        let stt = FakeTranscriber::ok("ola");
        let audio = base64::engine::general_purpose::STANDARD.encode(b"OggS fake audio");
        let res = normalize(payload("ptt", &audio), &stt, Some("pt")).await.unwrap();
        let Normalized::Accepted(msg) = res else {
            panic!("expected accepted");
        };
        assert_eq!(msg.text, "ola");

        let seen = stt.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, b"OggS fake audio");
        assert_eq!(seen[0].2.as_deref(), Some("pt"));
        assert!(seen[0].0.to_string_lossy().ends_with(".ogg"));
        assert!(!seen[0].0.exists());
    }

    #[tokio::test]
    async fn voice_note_data_url_is_accepted() {
        let stt = FakeTranscriber::ok("ola");
        let audio = format!(
            "data:audio/ogg; codecs=opus;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(b"OggS")
        );
        let res = normalize(payload("ptt", &audio), &stt, None).await.unwrap();
        assert!(matches!(res, Normalized::Accepted(m) if m.text == "ola"));
    }

    #[tokio::test]
    async fn transcription_failure_is_client_error_and_cleans_up() {
        let stt = FakeTranscriber::failing("whisper unavailable");
        let audio = base64::engine::general_purpose::STANDARD.encode(b"OggS");
        let err = normalize(payload("ptt", &audio), &stt, None).await.unwrap_err();
        assert!(matches!(
            err,
            IngressError::Transcription(ref m) if m.contains("whisper unavailable")
        ));
        let paths = stt.seen_paths();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
    }

    #[tokio::test]
    async fn invalid_base64_never_reaches_transcriber() {
        let stt = FakeTranscriber::ok("ola");
        let err = normalize(payload("ptt", "%%% not base64 %%%"), &stt, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngressError::Transcription(_)));
        assert!(stt.seen_paths().is_empty());
    }

    #[tokio::test]
    async fn filtered_events_are_skipped() {
        let stt = FakeTranscriber::ok("unused");
        assert!(matches!(
            normalize(payload("image", "base64image"), &stt, None)
                .await
                .unwrap(),
            Normalized::Skipped
        ));

        let mut old = payload("chat", "Oi");
        old["isNewMsg"] = json!(false);
        assert!(matches!(normalize(old, &stt, None).await.unwrap(), Normalized::Skipped));

        let mut ack = payload("chat", "Oi");
        ack["event"] = json!("onack");
        assert!(matches!(normalize(ack, &stt, None).await.unwrap(), Normalized::Skipped));

        assert!(matches!(
            normalize(json!({"event": "onpresencechanged"}), &stt, None)
                .await
                .unwrap(),
            Normalized::Skipped
        ));
    }

    #[tokio::test]
    async fn missing_fields_are_payload_errors() {
        let stt = FakeTranscriber::ok("unused");
        let mut no_sender = payload("chat", "Oi");
        no_sender.as_object_mut().unwrap().remove("sender");
        assert!(matches!(
            normalize(no_sender, &stt, None).await.unwrap_err(),
            IngressError::Payload(_)
        ));

        let mut no_session = payload("chat", "Oi");
        no_session.as_object_mut().unwrap().remove("session");
        assert!(matches!(
            normalize(no_session, &stt, None).await.unwrap_err(),
            IngressError::Payload(_)
        ));

        let mut blank_sender = payload("chat", "Oi");
        blank_sender["sender"]["id"] = json!("  ");
        assert!(matches!(
            normalize(blank_sender, &stt, None).await.unwrap_err(),
            IngressError::Payload(_)
        ));
    }

    #[test]
    fn criteria_require_exact_true() {
        let mut p = payload("chat", "Oi");
        p["isNewMsg"] = json!("true");
        assert!(!matches_criteria(&p));
    }
}
