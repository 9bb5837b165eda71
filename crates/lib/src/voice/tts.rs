//! Text-to-speech: Google Cloud Text-to-Speech, MP3 output.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Converts text to speech audio (MP3).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// `language` is a BCP-47 code such as "pt-BR".
    async fn synthesize(&self, text: &str, language: &str) -> Result<Bytes>;
}

pub struct GoogleTts {
    api_key: Option<String>,
    voice: Option<String>,
    client: reqwest::Client,
}

impl GoogleTts {
    pub fn new(api_key: Option<String>, voice: Option<String>) -> Self {
        Self {
            api_key,
            voice,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeBody<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Bytes> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("google tts api key not configured"))?;
        let body = SynthesizeBody {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: language,
                name: self.voice.as_deref(),
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        };
        let res = self
            .client
            .post(GOOGLE_TTS_URL)
            .query(&[("key", api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("sending google tts request")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("google tts failed: {} {}", status, body));
        }
        let data: SynthesizeResponse = res.json().await.context("parsing google tts response")?;
        let audio = base64::engine::general_purpose::STANDARD
            .decode(data.audio_content.as_bytes())
            .context("decoding google tts audio")?;
        Ok(Bytes::from(audio))
    }
}
