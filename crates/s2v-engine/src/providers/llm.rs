//! Chat-completion client for storyboard generation.
//!
//! Talks to an OpenAI-compatible chat endpoint (DashScope compatible
//! mode by default) and parses the model's JSON storyboard out of the
//! reply text.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use s2v_models::ShotDraft;

use super::{ProviderError, ProviderResult, StoryboardProvider};
use crate::error::{EngineError, EngineResult};

const DEFAULT_API_URL: &str =
    "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions";
const DEFAULT_MODEL: &str = "qwen-plus";

const MIN_SHOTS: usize = 6;
const MAX_SHOTS: usize = 10;
const MAX_NARRATION_CHARS: usize = 30;

const SYSTEM_PROMPT: &str = "\
You are a storyboard director. Split the user's story into 6 to 10 shots \
that together tell the whole story. Reply with JSON only, no prose and no \
code fences, in the shape {\"shots\": [...]}. Each shot has the fields: \
\"sequence\" (1-based number), \"subject\" (who or what is on screen), \
\"detail\" (one sentence describing the frame and its motion), \"camera\" \
(one of: fixed, push in, pull out, pan left, pan right, tilt up, tilt \
down, tracking), \"narration\" (voice-over line of at most 30 characters, \
empty string when the shot needs none), \"tone\" (delivery mood for the \
narration). Keep the visual style consistent across shots.";

/// Client for the storyboard chat model.
pub struct ChatStoryboardClient {
    api_url: String,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StoryboardDoc {
    shots: Vec<ShotDraft>,
}

impl ChatStoryboardClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    pub fn from_env() -> EngineResult<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| EngineError::config("LLM_API_KEY not set"))?;
        let api_url =
            std::env::var("LLM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self::new(api_url, api_key, model))
    }
}

#[async_trait::async_trait]
impl StoryboardProvider for ChatStoryboardClient {
    async fn generate_storyboard(&self, styled_script: &str) -> ProviderResult<Vec<ShotDraft>> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: styled_script,
                },
            ],
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

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ProviderError::malformed("chat response has no choices"))?;

        let drafts = parse_storyboard(content)?;
        debug!(shots = drafts.len(), "Storyboard parsed");
        Ok(drafts)
    }
}

/// Parse the model reply into shot drafts.
///
/// Models wrap JSON in code fences or lead-in prose often enough that a
/// plain parse failure falls back to slicing out the outermost braces.
fn parse_storyboard(content: &str) -> ProviderResult<Vec<ShotDraft>> {
    let doc: StoryboardDoc = match serde_json::from_str(content) {
        Ok(doc) => doc,
        Err(_) => {
            let sliced = slice_json_object(content).ok_or_else(|| {
                ProviderError::malformed("reply contains no JSON object")
            })?;
            serde_json::from_str(sliced)
                .map_err(|e| ProviderError::malformed(format!("storyboard JSON: {e}")))?
        }
    };

    if doc.shots.len() < MIN_SHOTS || doc.shots.len() > MAX_SHOTS {
        return Err(ProviderError::malformed(format!(
            "storyboard has {} shots, expected {MIN_SHOTS}..={MAX_SHOTS}",
            doc.shots.len()
        )));
    }

    Ok(doc.shots.into_iter().map(clamp_narration).collect())
}

fn slice_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn clamp_narration(mut draft: ShotDraft) -> ShotDraft {
    if let Some(narration) = draft.narration.as_ref() {
        if narration.chars().count() > MAX_NARRATION_CHARS {
            warn!(
                len = narration.chars().count(),
                "Narration over limit, truncating"
            );
            let clipped: String = narration.chars().take(MAX_NARRATION_CHARS - 1).collect();
            draft.narration = Some(format!("{clipped}…"));
        }
    }
    draft
}
