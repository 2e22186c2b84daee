//! Credentials and tuning knobs.
//!
//! [`AppConfig`] is the user's provider configuration, persisted by the host
//! app as camelCase JSON. [`SynthesisOptions`] tunes the orchestrator.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{chunker::LengthUnit, error::SynthesisError, wav::DEFAULT_SILENCE_MS};

// ─────────────────────────────────────────────────────────────────────────────
// AppConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Provider credentials and voice selection.
///
/// Unknown keys in the JSON file are ignored; missing keys take defaults.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Bearer credential: the provider API key, or the app secret when
    /// talking to the proxy.
    pub tts_api_key: String,
    pub tts_voice: String,
    pub tts_language_type: String,
    pub tts_model: String,
    /// Cloudflare Workers proxy endpoint, when the proxy is used.
    pub proxy_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tts_api_key: String::new(),
            tts_voice: "Cherry".to_string(),
            tts_language_type: "Chinese".to_string(),
            tts_model: "qwen3-tts-flash".to_string(),
            proxy_url: None,
        }
    }
}

// Keep the key out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field(
                "tts_api_key",
                &if self.tts_api_key.is_empty() { "<unset>" } else { "<redacted>" },
            )
            .field("tts_voice", &self.tts_voice)
            .field("tts_language_type", &self.tts_language_type)
            .field("tts_model", &self.tts_model)
            .field("proxy_url", &self.proxy_url)
            .finish()
    }
}

impl AppConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Override fields from `AUDIOFY_TTS_API_KEY`, `AUDIOFY_TTS_VOICE` and
    /// `AUDIOFY_PROXY_URL` when they are set and non-empty.
    pub fn apply_env(mut self) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        if let Some(key) = var("AUDIOFY_TTS_API_KEY") {
            self.tts_api_key = key;
        }
        if let Some(voice) = var("AUDIOFY_TTS_VOICE") {
            self.tts_voice = voice;
        }
        if let Some(url) = var("AUDIOFY_PROXY_URL") {
            self.proxy_url = Some(url);
        }
        self
    }

    pub fn is_tts_configured(&self) -> bool {
        !self.tts_api_key.trim().is_empty() && !self.tts_voice.trim().is_empty()
    }

    /// Reject configurations no provider call could succeed with.
    pub fn validate(&self) -> Result<(), SynthesisError> {
        if self.tts_api_key.trim().is_empty() {
            return Err(SynthesisError::InvalidArgument("TTS API key is not configured".into()));
        }
        if self.tts_voice.trim().is_empty() {
            return Err(SynthesisError::InvalidArgument("TTS voice is not configured".into()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator options
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff for retryable chunk failures.
///
/// Delay before retry `n` (0-based) is `min(base_delay × 2ⁿ, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 1_000, max_delay_ms: 30_000 }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Provider-imposed ceiling per request, measured in `length_unit`.
    pub max_chunk_len: usize,
    pub length_unit: LengthUnit,
    /// Chunk requests in flight at once; 1 means strictly sequential.
    pub concurrency: usize,
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub insert_silence: bool,
    pub silence_ms: u32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            max_chunk_len: crate::chunker::DEFAULT_MAX_LEN,
            length_unit: LengthUnit::Chars,
            concurrency: 1,
            request_timeout_ms: 60_000,
            retry: RetryPolicy::default(),
            insert_silence: true,
            silence_ms: DEFAULT_SILENCE_MS,
        }
    }
}

impl SynthesisOptions {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"ttsApiKey":"sk-1","somethingElse":true}"#).unwrap();
        assert_eq!(cfg.tts_api_key, "sk-1");
        assert_eq!(cfg.tts_voice, "Cherry");
        assert_eq!(cfg.tts_language_type, "Chinese");
        assert!(cfg.proxy_url.is_none());
        assert!(cfg.is_tts_configured());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_key() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidArgument(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let cfg = AppConfig { tts_api_key: "sk-secret".into(), ..AppConfig::default() };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-secret"), "got: {dbg}");
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"ttsApiKey":"k","ttsVoice":"Dylan","proxyUrl":"https://tts.example.workers.dev"}"#,
        )
        .unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.tts_voice, "Dylan");
        assert_eq!(cfg.proxy_url.as_deref(), Some("https://tts.example.workers.dev"));

        assert!(AppConfig::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
        assert_eq!(policy.backoff(200), Duration::from_secs(30));
    }

    #[test]
    fn test_options_from_json() {
        let opts: SynthesisOptions = serde_json::from_str(
            r#"{"length_unit":"utf8_bytes","retry":{"max_retries":5}}"#,
        )
        .unwrap();
        assert_eq!(opts.length_unit, LengthUnit::Utf8Bytes);
        assert_eq!(opts.retry.max_retries, 5);
        assert_eq!(opts.retry.base_delay_ms, 1_000);
        assert_eq!(opts.max_chunk_len, 600);
        assert_eq!(opts.request_timeout(), Duration::from_secs(60));
    }
}
