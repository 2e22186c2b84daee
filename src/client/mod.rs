//! TTS provider abstraction.
//!
//! The orchestrator only sees [`TtsClient`]: one text in, one WAV buffer out,
//! failures classified as [`TtsError`]. Wire protocols live in the
//! implementations behind the `proxy` feature.

use std::time::Duration;

use async_trait::async_trait;

use crate::{config::AppConfig, error::TtsError};

#[cfg(feature = "proxy")]
mod dashscope;
#[cfg(feature = "proxy")]
mod proxy;

#[cfg(feature = "proxy")]
pub use dashscope::DashScopeTtsClient;
#[cfg(feature = "proxy")]
pub use proxy::ProxyTtsClient;

/// Longest text a single provider request accepts (characters).
pub const MAX_REQUEST_CHARS: usize = 5_000;

/// Whole-request timeout of the HTTP clients.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
#[cfg_attr(not(feature = "proxy"), allow(dead_code))]
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A text-to-speech backend returning WAV bytes.
#[async_trait]
pub trait TtsClient: Send + Sync {
    /// Synthesize `text` with the voice and credentials in `config`.
    async fn synthesize(&self, text: &str, config: &AppConfig) -> Result<Vec<u8>, TtsError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Map a non-success HTTP status to the client taxonomy.
///
/// A 408 reports the full [`REQUEST_TIMEOUT`] budget as spent.
pub fn classify_status(status: u16, body: &str) -> TtsError {
    let body = body.trim();
    let message = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    match status {
        401 | 403 => TtsError::Unauthorized(message),
        408 => TtsError::Timeout(REQUEST_TIMEOUT),
        429 => TtsError::RateLimited(message),
        400..=499 => TtsError::InvalidInput(message),
        _ => TtsError::ServerError { status: Some(status), message },
    }
}

/// Checks shared by every client before anything goes on the wire.
#[cfg_attr(not(feature = "proxy"), allow(dead_code))]
pub(crate) fn check_request(text: &str, config: &AppConfig) -> Result<(), TtsError> {
    if !config.is_tts_configured() {
        return Err(TtsError::InvalidInput("TTS configuration is incomplete".into()));
    }
    if text.trim().is_empty() {
        return Err(TtsError::InvalidInput("text is empty".into()));
    }
    let len = text.chars().count();
    if len > MAX_REQUEST_CHARS {
        return Err(TtsError::InvalidInput(format!(
            "text is {len} characters, limit is {MAX_REQUEST_CHARS}"
        )));
    }
    Ok(())
}

#[cfg(feature = "proxy")]
pub(crate) fn classify_transport(err: reqwest::Error, timeout: Duration) -> TtsError {
    if err.is_timeout() {
        TtsError::Timeout(timeout)
    } else if let Some(status) = err.status() {
        classify_status(status.as_u16(), "")
    } else if err.is_decode() {
        TtsError::MalformedResponse(err.to_string())
    } else {
        TtsError::ServerError { status: None, message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(401, "").kind(), ErrorKind::Unauthorized);
        assert_eq!(classify_status(403, "quota").kind(), ErrorKind::Unauthorized);
        assert_eq!(classify_status(408, "").kind(), ErrorKind::Timeout);
        assert_eq!(classify_status(429, "").kind(), ErrorKind::RateLimited);
        assert_eq!(classify_status(400, "bad text").kind(), ErrorKind::InvalidArgument);
        assert_eq!(classify_status(413, "").kind(), ErrorKind::InvalidArgument);
        assert_eq!(classify_status(500, "").kind(), ErrorKind::ServerError);
        assert_eq!(classify_status(503, "").kind(), ErrorKind::ServerError);
        assert!(classify_status(502, "").is_retryable());
        assert!(!classify_status(401, "").is_retryable());
    }

    #[test]
    fn test_request_timeout_status_reports_budget() {
        let err = classify_status(408, "");
        assert!(matches!(err, TtsError::Timeout(d) if d == REQUEST_TIMEOUT));
        assert_eq!(err.to_string(), "request timed out after 60s");
    }

    #[test]
    fn test_classify_status_keeps_body() {
        let err = classify_status(500, "  upstream exploded \n");
        assert_eq!(err.to_string(), "server error (500): HTTP 500: upstream exploded");
    }

    #[test]
    fn test_check_request() {
        let cfg = AppConfig { tts_api_key: "k".into(), ..AppConfig::default() };
        assert!(check_request("你好。", &cfg).is_ok());
        assert!(matches!(check_request("  ", &cfg), Err(TtsError::InvalidInput(_))));
        assert!(matches!(check_request(&"字".repeat(5_001), &cfg), Err(TtsError::InvalidInput(_))));
        assert!(check_request(&"字".repeat(5_000), &cfg).is_ok());
        assert!(matches!(
            check_request("hi", &AppConfig::default()),
            Err(TtsError::InvalidInput(_))
        ));
    }
}
