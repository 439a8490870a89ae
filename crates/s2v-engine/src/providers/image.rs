//! Text-to-image client for keyframe generation.

use std::path::Path;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ImageProvider, ProviderError, ProviderResult};
use crate::error::{EngineError, EngineResult};

const DEFAULT_API_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation";
const DEFAULT_MODEL: &str = "qwen-image-plus";
const DEFAULT_SIZE: &str = "1280*720";

/// Client for the keyframe image model.
pub struct ImageGenClient {
    api_url: String,
    api_key: String,
    model: String,
    size: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    input: ImageInput<'a>,
    parameters: ImageParameters<'a>,
}

#[derive(Debug, Serialize)]
struct ImageInput<'a> {
    messages: Vec<ImageMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ImageMessage<'a> {
    role: &'a str,
    content: Vec<ImagePart<'a>>,
}

#[derive(Debug, Serialize)]
struct ImagePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageParameters<'a> {
    size: &'a str,
    prompt_extend: bool,
    watermark: bool,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    output: Option<ImageOutput>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageOutput {
    choices: Vec<ImageChoice>,
}

#[derive(Debug, Deserialize)]
struct ImageChoice {
    message: ImageReply,
}

#[derive(Debug, Deserialize)]
struct ImageReply {
    content: Vec<Value>,
}

impl ImageGenClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            size: size.into(),
            client: Client::new(),
        }
    }

    pub fn from_env() -> EngineResult<Self> {
        let api_key = std::env::var("IMAGE_API_KEY")
            .or_else(|_| std::env::var("LLM_API_KEY"))
            .map_err(|_| EngineError::config("IMAGE_API_KEY not set"))?;
        let api_url =
            std::env::var("IMAGE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let model = std::env::var("IMAGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let size = std::env::var("IMAGE_SIZE").unwrap_or_else(|_| DEFAULT_SIZE.to_string());
        Ok(Self::new(api_url, api_key, model, size))
    }

    async fn request_image_url(&self, prompt: &str) -> ProviderResult<String> {
        let request = ImageRequest {
            model: &self.model,
            input: ImageInput {
                messages: vec![ImageMessage {
                    role: "user",
                    content: vec![ImagePart { text: prompt }],
                }],
            },
            parameters: ImageParameters {
                size: &self.size,
                prompt_extend: false,
                watermark: false,
            },
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let reply: ImageResponse = response.json().await?;
        if let Some(code) = reply.code.filter(|c| !c.is_empty()) {
            return Err(ProviderError::fatal(format!(
                "image generation rejected ({code}): {}",
                reply.message.unwrap_or_default()
            )));
        }

        reply
            .output
            .and_then(|o| o.choices.into_iter().next())
            .and_then(|c| {
                c.message
                    .content
                    .into_iter()
                    .find_map(|part| part.get("image")?.as_str().map(str::to_string))
            })
            .ok_or_else(|| ProviderError::malformed("image response carries no image URL"))
    }
}

#[async_trait::async_trait]
impl ImageProvider for ImageGenClient {
    async fn generate_image(&self, prompt: &str, dest: &Path) -> ProviderResult<()> {
        let image_url = self.request_image_url(prompt).await?;
        debug!(url = %image_url, "Image generated, downloading");

        let response = self.client.get(&image_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "image download failed with HTTP {status}"
            )));
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::transient(format!("create image dir: {e}")))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ProviderError::transient(format!("write image file: {e}")))?;
        Ok(())
    }
}
