//! Client for the Cloudflare Workers TTS proxy.
//!
//! The worker keeps the provider key server-side. The app authenticates with
//! its own secret:
//!
//! ```text
//! POST {proxy_url}
//! Authorization: Bearer <app secret>
//! {"text": "...", "voice": "Cherry"}
//!
//! 200 {"audioData": "<base64 WAV>", "duration": 12}
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    check_request, classify_status, classify_transport, TtsClient, CONNECT_TIMEOUT, REQUEST_TIMEOUT,
};
use crate::{config::AppConfig, error::TtsError};

#[derive(Serialize)]
struct ProxyRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyResponse {
    audio_data: String,
    #[serde(default)]
    duration: Option<f64>,
}

pub struct ProxyTtsClient {
    client: Client,
    /// Overrides `AppConfig::proxy_url` when set.
    endpoint: Option<String>,
}

impl ProxyTtsClient {
    pub fn new() -> Result<Self, TtsError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TtsError::ServerError {
                status: None,
                message: format!("HTTP client setup failed: {e}"),
            })?;
        Ok(Self { client, endpoint: None })
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    fn endpoint<'a>(&'a self, config: &'a AppConfig) -> Result<&'a str, TtsError> {
        self.endpoint
            .as_deref()
            .or(config.proxy_url.as_deref())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| TtsError::InvalidInput("proxy URL is not configured".into()))
    }
}

/// Decode the worker's JSON body into WAV bytes.
fn decode_response(body: &[u8]) -> Result<Vec<u8>, TtsError> {
    let parsed: ProxyResponse = serde_json::from_slice(body)
        .map_err(|e| TtsError::MalformedResponse(format!("invalid proxy JSON: {e}")))?;
    if parsed.audio_data.is_empty() {
        return Err(TtsError::MalformedResponse("proxy returned no audioData".into()));
    }
    let audio = STANDARD
        .decode(parsed.audio_data.trim())
        .map_err(|e| TtsError::MalformedResponse(format!("audioData is not base64: {e}")))?;
    debug!(bytes = audio.len(), reported_duration = ?parsed.duration, "decoded proxy audio");
    Ok(audio)
}

#[async_trait]
impl TtsClient for ProxyTtsClient {
    async fn synthesize(&self, text: &str, config: &AppConfig) -> Result<Vec<u8>, TtsError> {
        check_request(text, config)?;
        let url = self.endpoint(config)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.tts_api_key)
            .json(&ProxyRequest { text: text.trim(), voice: &config.tts_voice })
            .send()
            .await
            .map_err(|e| classify_transport(e, REQUEST_TIMEOUT))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let body = response.bytes().await.map_err(|e| classify_transport(e, REQUEST_TIMEOUT))?;
        decode_response(&body)
    }

    fn name(&self) -> &'static str {
        "proxy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_response() {
        let wav = b"RIFF....WAVEfmt ";
        let body = format!(r#"{{"audioData":"{}","duration":3}}"#, STANDARD.encode(wav));
        assert_eq!(decode_response(body.as_bytes()).unwrap(), wav);
    }

    #[test]
    fn test_decode_response_rejects_garbage() {
        assert!(matches!(decode_response(b"not json"), Err(TtsError::MalformedResponse(_))));
        assert!(matches!(
            decode_response(br#"{"audioData":"%%%"}"#),
            Err(TtsError::MalformedResponse(_))
        ));
        assert!(matches!(
            decode_response(br#"{"audioData":""}"#),
            Err(TtsError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_before_network() {
        let client = ProxyTtsClient::new().unwrap();
        let cfg = AppConfig { tts_api_key: "secret".into(), ..AppConfig::default() };
        let err = client.synthesize("你好。", &cfg).await.unwrap_err();
        assert!(matches!(err, TtsError::InvalidInput(_)), "got: {err}");
    }
}
