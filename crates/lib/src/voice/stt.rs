//! Speech-to-text: Groq's Whisper-compatible transcription endpoint.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Converts recorded audio to text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `audio`. `language` is an ISO 639-1 hint.
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<String>;
}

/// Groq Whisper transcription (OpenAI-compatible multipart API).
pub struct GroqTranscriber {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl std::fmt::Debug for GroqTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqTranscriber")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl GroqTranscriber {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Transcriber for GroqTranscriber {
    async fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("groq api key not configured"))?;
        let data = tokio::fs::read(audio)
            .await
            .with_context(|| format!("reading audio from {}", audio.display()))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.ogg".to_string());
        let file_part = Part::bytes(data)
            .file_name(file_name)
            .mime_str("audio/ogg")
            .context("building audio part")?;
        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let res = self
            .client
            .post(format!("{}/audio/transcriptions", GROQ_API_BASE))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .context("sending groq transcription request")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("groq transcription failed: {} {}", status, body));
        }
        let data: TranscriptionResponse = res
            .json()
            .await
            .context("parsing groq transcription response")?;
        Ok(data.text)
    }
}
