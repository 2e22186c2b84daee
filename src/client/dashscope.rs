//! Direct Qwen3 TTS client (DashScope multimodal-generation API).
//!
//! Two round-trips per chunk: the generation call returns a short-lived audio
//! URL, which is then downloaded.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    check_request, classify_status, classify_transport, TtsClient, CONNECT_TIMEOUT, REQUEST_TIMEOUT,
};
use crate::{config::AppConfig, error::TtsError};

pub const DASHSCOPE_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation";

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput<'a>,
}

#[derive(Serialize)]
struct GenerationInput<'a> {
    text: &'a str,
    voice: &'a str,
    language_type: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    output: GenerationOutput,
    #[serde(default)]
    request_id: Option<String>,
}

#[derive(Deserialize)]
struct GenerationOutput {
    audio: AudioInfo,
}

#[derive(Deserialize)]
struct AudioInfo {
    url: String,
}

pub struct DashScopeTtsClient {
    client: Client,
    base_url: String,
}

impl DashScopeTtsClient {
    pub fn new() -> Result<Self, TtsError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TtsError::ServerError {
                status: None,
                message: format!("HTTP client setup failed: {e}"),
            })?;
        Ok(Self { client, base_url: DASHSCOPE_URL.to_string() })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn audio_url(&self, text: &str, config: &AppConfig) -> Result<String, TtsError> {
        let request = GenerationRequest {
            model: &config.tts_model,
            input: GenerationInput {
                text,
                voice: &config.tts_voice,
                language_type: &config.tts_language_type,
            },
        };
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&config.tts_api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(e, REQUEST_TIMEOUT))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }
        let body = response.bytes().await.map_err(|e| classify_transport(e, REQUEST_TIMEOUT))?;
        parse_audio_url(&body)
    }
}

fn parse_audio_url(body: &[u8]) -> Result<String, TtsError> {
    let parsed: GenerationResponse = serde_json::from_slice(body)
        .map_err(|e| TtsError::MalformedResponse(format!("invalid DashScope JSON: {e}")))?;
    debug!(request_id = ?parsed.request_id, "DashScope generation done");
    if parsed.output.audio.url.is_empty() {
        return Err(TtsError::MalformedResponse("DashScope returned an empty audio URL".into()));
    }
    Ok(parsed.output.audio.url)
}

#[async_trait]
impl TtsClient for DashScopeTtsClient {
    async fn synthesize(&self, text: &str, config: &AppConfig) -> Result<Vec<u8>, TtsError> {
        check_request(text, config)?;
        let url = self.audio_url(text, config).await?;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport(e, REQUEST_TIMEOUT))?;
        let status = response.status();
        if !status.is_success() {
            // The URL is pre-signed; auth failures here mean it expired, not bad credentials.
            return Err(TtsError::ServerError {
                status: Some(status.as_u16()),
                message: "audio download failed".into(),
            });
        }
        let audio = response.bytes().await.map_err(|e| classify_transport(e, REQUEST_TIMEOUT))?;
        Ok(audio.to_vec())
    }

    fn name(&self) -> &'static str {
        "dashscope"
    }
}
