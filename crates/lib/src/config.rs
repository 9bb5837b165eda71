//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.wppbridge/config.json`) and environment.
//! Environment variables override file values; a `.env` file is loaded by the binary
//! before this runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Aggregation window settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Transcription and speech synthesis settings.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Conversational agent (LLM) settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Outbound WPPConnect server settings.
    #[serde(default)]
    pub wppconnect: WppConnectConfig,

    /// How agent answers are delivered back to the sender.
    #[serde(default)]
    pub reply: ReplyConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook HTTP server (default 8000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Window duration and agent call bound, both in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    /// Seconds a window stays open after the first message of a burst. Overridden by WAIT_TIME env.
    #[serde(default = "default_wait_time")]
    pub wait_time: u64,

    /// Seconds to wait for the agent before the dispatch is abandoned.
    /// Overridden by AGENT_TIMEOUT env.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout: u64,
}

fn default_wait_time() -> u64 {
    1
}

fn default_agent_timeout() -> u64 {
    60
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            wait_time: default_wait_time(),
            agent_timeout: default_agent_timeout(),
        }
    }
}

/// Speech-to-text (Groq Whisper) and text-to-speech (Google Cloud) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    /// Language hint for transcription (ISO 639-1, e.g. "pt"). Overridden by LANGUAGE env.
    pub language: Option<String>,
    /// Whisper model used by the Groq transcription endpoint.
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    /// Groq API key. Overridden by GROQ_API_KEY env.
    pub groq_api_key: Option<String>,
    /// Google Cloud API key for text-to-speech. Overridden by GOOGLE_API_KEY env.
    pub google_api_key: Option<String>,
    /// BCP-47 language code used for synthesized replies.
    #[serde(default = "default_tts_language_code")]
    pub tts_language_code: String,
    /// Optional Google voice name; when unset, the provider default for the language is used.
    pub tts_voice: Option<String>,
}

fn default_transcription_model() -> String {
    "whisper-large-v3".to_string()
}

fn default_tts_language_code() -> String {
    "pt-BR".to_string()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: None,
            transcription_model: default_transcription_model(),
            groq_api_key: None,
            google_api_key: None,
            tts_language_code: default_tts_language_code(),
            tts_voice: None,
        }
    }
}

/// Agent defaults (model, Ollama endpoint, system prompt).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Ollama model name as shown by `ollama list` (e.g. "llama3.2:latest").
    pub model: Option<String>,
    /// Ollama base URL (default http://127.0.0.1:11434).
    pub ollama_base_url: Option<String>,
    /// Optional system prompt prepended to every conversation turn.
    pub system_prompt: Option<String>,
}

/// WPPConnect server used to send replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WppConnectConfig {
    /// Server root (default http://localhost:21465).
    #[serde(default = "default_wppconnect_base_url")]
    pub base_url: String,
    /// WPPConnect session name replies are sent through.
    pub session: Option<String>,
    /// Bearer token for the session. Overridden by WPPCONNECT_TOKEN env.
    pub token: Option<String>,
}

fn default_wppconnect_base_url() -> String {
    "http://localhost:21465".to_string()
}

impl Default for WppConnectConfig {
    fn default() -> Self {
        Self {
            base_url: default_wppconnect_base_url(),
            session: None,
            token: None,
        }
    }
}

/// Reply delivery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyConfig {
    #[serde(default)]
    pub mode: ReplyMode,
}

/// Whether a direct answer is sent as text, as a voice note, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    Text,
    /// Synthesize the answer and send it as a voice note only.
    #[default]
    Voice,
    Both,
}

impl ReplyMode {
    pub fn sends_text(self) -> bool {
        matches!(self, ReplyMode::Text | ReplyMode::Both)
    }

    pub fn sends_voice(self) -> bool {
        matches!(self, ReplyMode::Voice | ReplyMode::Both)
    }
}

/// Read an env var; unset, empty, or whitespace-only values count as absent.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| non_empty(Some(&s)))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Longest accepted window or agent timeout (one day).
const MAX_SECONDS: u64 = 86_400;

/// Parse a whole number of seconds from an env override, falling back to the configured value.
/// Either source must lie in `min..=MAX_SECONDS`.
fn parse_seconds(key: &str, raw: Option<&str>, configured: u64, min: u64) -> Result<Duration> {
    let secs = match raw {
        Some(v) => v.trim().parse::<u64>().with_context(|| {
            format!("{} must be a whole number of seconds, got {:?}", key, v)
        })?,
        None => configured,
    };
    if !(min..=MAX_SECONDS).contains(&secs) {
        anyhow::bail!(
            "{} must be between {} and {} seconds, got {}",
            key,
            min,
            MAX_SECONDS,
            secs
        );
    }
    Ok(Duration::from_secs(secs))
}

/// Resolve the aggregation window duration: env WAIT_TIME overrides config.
pub fn resolve_wait_time(config: &Config) -> Result<Duration> {
    parse_seconds(
        "WAIT_TIME",
        env_value("WAIT_TIME").as_deref(),
        config.aggregation.wait_time,
        0,
    )
}

/// Resolve the agent call timeout: env AGENT_TIMEOUT overrides config. Zero is rejected.
pub fn resolve_agent_timeout(config: &Config) -> Result<Duration> {
    parse_seconds(
        "AGENT_TIMEOUT",
        env_value("AGENT_TIMEOUT").as_deref(),
        config.aggregation.agent_timeout,
        1,
    )
}

/// Resolve the transcription language hint: env LANGUAGE overrides config.
pub fn resolve_language(config: &Config) -> Option<String> {
    env_value("LANGUAGE").or_else(|| non_empty(config.voice.language.as_ref()))
}

/// Resolve the Groq API key: env GROQ_API_KEY overrides config.
pub fn resolve_groq_api_key(config: &Config) -> Option<String> {
    env_value("GROQ_API_KEY").or_else(|| non_empty(config.voice.groq_api_key.as_ref()))
}

/// Resolve the Google Cloud API key: env GOOGLE_API_KEY overrides config.
pub fn resolve_google_api_key(config: &Config) -> Option<String> {
    env_value("GOOGLE_API_KEY").or_else(|| non_empty(config.voice.google_api_key.as_ref()))
}

/// Resolve the WPPConnect bearer token: env WPPCONNECT_TOKEN overrides config.
pub fn resolve_wppconnect_token(config: &Config) -> Option<String> {
    env_value("WPPCONNECT_TOKEN").or_else(|| non_empty(config.wppconnect.token.as_ref()))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WPPBRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".wppbridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (WPPBRIDGE_CONFIG_PATH).
/// Missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.gateway.bind, "127.0.0.1");
        assert_eq!(config.aggregation.wait_time, 1);
        assert_eq!(config.aggregation.agent_timeout, 60);
        assert_eq!(config.voice.transcription_model, "whisper-large-v3");
        assert_eq!(config.reply.mode, ReplyMode::Voice);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"aggregation":{"waitTime":3},"reply":{"mode":"both"},"wppconnect":{"session":"bot"}}"#,
        )
        .unwrap();
        assert_eq!(config.aggregation.wait_time, 3);
        assert_eq!(config.aggregation.agent_timeout, 60);
        assert_eq!(config.reply.mode, ReplyMode::Both);
        assert_eq!(config.wppconnect.session.as_deref(), Some("bot"));
        assert_eq!(config.wppconnect.base_url, "http://localhost:21465");
    }

    #[test]
    fn parse_seconds_prefers_override() {
        assert_eq!(
            parse_seconds("WAIT_TIME", Some(" 5 "), 1, 0).unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            parse_seconds("WAIT_TIME", None, 2, 0).unwrap(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn parse_seconds_rejects_garbage() {
        let err = parse_seconds("WAIT_TIME", Some("soon"), 1, 0).unwrap_err();
        assert!(err.to_string().contains("WAIT_TIME"));
    }

    #[test]
    fn parse_seconds_enforces_bounds() {
        assert_eq!(
            parse_seconds("WAIT_TIME", Some("0"), 1, 0).unwrap(),
            Duration::ZERO
        );
        assert!(parse_seconds("WAIT_TIME", Some("86401"), 1, 0).is_err());
        assert!(parse_seconds("WAIT_TIME", None, u64::MAX, 0).is_err());
        let err = parse_seconds("AGENT_TIMEOUT", Some("0"), 60, 1).unwrap_err();
        assert!(err.to_string().contains("AGENT_TIMEOUT"));
    }

    #[test]
    fn oversized_configured_durations_are_rejected() {
        let mut config = Config::default();
        config.aggregation.wait_time = u64::MAX;
        config.aggregation.agent_timeout = 0;
        assert!(parse_seconds("WAIT_TIME", None, config.aggregation.wait_time, 0).is_err());
        assert!(parse_seconds("AGENT_TIMEOUT", None, config.aggregation.agent_timeout, 1).is_err());
    }

    #[test]
    fn reply_mode_branches() {
        assert!(ReplyMode::Text.sends_text());
        assert!(!ReplyMode::Text.sends_voice());
        assert!(ReplyMode::Voice.sends_voice());
        assert!(!ReplyMode::Voice.sends_text());
        assert!(ReplyMode::Both.sends_text() && ReplyMode::Both.sends_voice());
    }

    #[test]
    fn non_empty_trims_and_drops_blank() {
        assert_eq!(non_empty(Some(&"  key ".to_string())), Some("key".to_string()));
        assert_eq!(non_empty(Some(&"   ".to_string())), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path) = load_config(Some(dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.gateway.port, 8000);
        assert!(path.ends_with("absent.json"));
    }
}
