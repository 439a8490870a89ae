//! Speech synthesis client for shot narration.

use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{ProviderError, ProviderResult, SpeechProvider};
use crate::error::{EngineError, EngineResult};

const DEFAULT_VOICE: &str = "longxiaochun";

/// Client for an HTTP text-to-speech service that answers with encoded
/// audio in the response body.
pub struct TtsClient {
    api_url: String,
    voice: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    voice: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tone: Option<&'a str>,
}

impl TtsClient {
    pub fn new(api_url: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            voice: voice.into(),
            client: Client::new(),
        }
    }

    pub fn from_env() -> EngineResult<Self> {
        let api_url = std::env::var("TTS_API_URL")
            .map_err(|_| EngineError::config("TTS_API_URL not set"))?;
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());
        Ok(Self::new(api_url, voice))
    }
}

#[async_trait::async_trait]
impl SpeechProvider for TtsClient {
    async fn synthesize(&self, text: &str, tone: Option<&str>) -> ProviderResult<Vec<u8>> {
        let request = TtsRequest {
            text,
            voice: &self.voice,
            tone,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::malformed("speech service returned no audio"));
        }
        debug!(bytes = bytes.len(), "Narration synthesized");
        Ok(bytes.to_vec())
    }
}
