//! Hosted image-to-video client (wan-style asynchronous task API).
//!
//! Submission returns a task id; status lives at a polling endpoint.
//! The backend only accepts remote image URLs, so the local keyframe is
//! staged through media storage first.

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    JobPhase, JobPoll, MediaStorage, ProviderError, ProviderResult, SubmitAck, VideoJobClient,
    VideoJobSpec,
};
use crate::error::{EngineError, EngineResult};

const DEFAULT_API_BASE: &str = "https://dashscope.aliyuncs.com";
const DEFAULT_MODEL: &str = "wan2.2-i2v-plus";
const DEFAULT_RESOLUTION: &str = "720P";
const DEFAULT_DURATION_SECS: u32 = 5;
const DEFAULT_CONCURRENCY: usize = 5;

/// Client for the hosted image-to-video service.
pub struct WanVideoClient {
    api_base: String,
    api_key: String,
    model: String,
    resolution: String,
    duration_secs: u32,
    concurrency: usize,
    storage: Arc<dyn MediaStorage>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    model: &'a str,
    input: SubmitInput<'a>,
    parameters: SubmitParameters<'a>,
}

#[derive(Debug, Serialize)]
struct SubmitInput<'a> {
    prompt: &'a str,
    img_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SubmitParameters<'a> {
    resolution: &'a str,
    duration: u32,
    prompt_extend: bool,
    watermark: bool,
}

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    output: Option<TaskOutput>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    task_id: Option<String>,
    task_status: Option<String>,
    video_url: Option<String>,
    #[serde(rename = "message")]
    task_message: Option<String>,
}

impl WanVideoClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        storage: Arc<dyn MediaStorage>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            resolution: DEFAULT_RESOLUTION.to_string(),
            duration_secs: DEFAULT_DURATION_SECS,
            concurrency: DEFAULT_CONCURRENCY,
            storage,
            client: Client::new(),
        }
    }

    pub fn from_env(storage: Arc<dyn MediaStorage>) -> EngineResult<Self> {
        let api_key = std::env::var("VIDEO_API_KEY")
            .or_else(|_| std::env::var("LLM_API_KEY"))
            .map_err(|_| EngineError::config("VIDEO_API_KEY not set"))?;
        let api_base =
            std::env::var("VIDEO_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let model = std::env::var("VIDEO_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let mut client = Self::new(api_base, api_key, model, storage);
        if let Ok(res) = std::env::var("VIDEO_RESOLUTION") {
            client.resolution = res;
        }
        if let Ok(n) = std::env::var("VIDEO_CONCURRENCY") {
            client.concurrency = n
                .parse()
                .map_err(|_| EngineError::config("VIDEO_CONCURRENCY must be a number"))?;
        }
        Ok(client)
    }

    async fn parse_envelope(response: reqwest::Response) -> ProviderResult<(TaskEnvelope, Value)> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }
        let raw: Value = response.json().await?;
        let envelope: TaskEnvelope = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::malformed(format!("task envelope: {e}")))?;
        if let Some(code) = envelope.code.as_deref().filter(|c| !c.is_empty()) {
            return Err(ProviderError::fatal(format!(
                "video service rejected the task ({code}): {}",
                envelope.message.clone().unwrap_or_default()
            )));
        }
        Ok((envelope, raw))
    }
}

#[async_trait::async_trait]
impl VideoJobClient for WanVideoClient {
    async fn submit(&self, spec: &VideoJobSpec) -> ProviderResult<SubmitAck> {
        let stem = Uuid::new_v4();
        let input_key = format!("users/temp/i2v_inputs/{stem}.png");
        let img_url = self
            .storage
            .upload(&input_key, &spec.keyframe, "image/png")
            .await?;
        debug!(url = %img_url, "Keyframe staged for video job");

        let request = SubmitRequest {
            model: &self.model,
            input: SubmitInput {
                prompt: &spec.prompt,
                img_url: &img_url,
                audio_url: spec.audio_url.as_deref(),
            },
            parameters: SubmitParameters {
                resolution: &self.resolution,
                duration: self.duration_secs,
                prompt_extend: false,
                watermark: false,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/api/v1/services/aigc/video-generation/video-synthesis",
                self.api_base
            ))
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&request)
            .send()
            .await?;

        let (envelope, raw) = Self::parse_envelope(response).await?;
        let job_id = envelope
            .output
            .and_then(|o| o.task_id)
            .ok_or_else(|| ProviderError::malformed("submission ack carries no task id"))?;
        info!(job = %job_id, "Video job submitted");
        Ok(SubmitAck { job_id, raw })
    }

    async fn poll(&self, job_id: &str) -> ProviderResult<JobPoll> {
        let response = self
            .client
            .get(format!("{}/api/v1/tasks/{job_id}", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let (envelope, raw) = Self::parse_envelope(response).await?;
        let output = envelope
            .output
            .ok_or_else(|| ProviderError::malformed("task status carries no output"))?;

        let phase = match output.task_status.as_deref() {
            Some("PENDING") | Some("RUNNING") => JobPhase::InProgress,
            Some("SUCCEEDED") => JobPhase::Succeeded,
            Some(_) => JobPhase::Failed,
            None => {
                return Err(ProviderError::malformed("task status field missing"));
            }
        };
        let message = match phase {
            JobPhase::Failed => Some(
                output
                    .task_message
                    .unwrap_or_else(|| format!("task status {:?}", output.task_status)),
            ),
            _ => None,
        };

        Ok(JobPoll {
            phase,
            result_url: output.video_url,
            message,
            raw,
        })
    }

    async fn download(&self, result_url: &str, dest: &Path) -> ProviderResult<()> {
        self.storage.download_url(result_url, dest).await
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NullStorage;

    #[async_trait::async_trait]
    impl MediaStorage for NullStorage {
        async fn upload(&self, key: &str, _path: &Path, _ct: &str) -> ProviderResult<String> {
            Ok(format!("https://media.example/{key}"))
        }

        async fn download_url(&self, _url: &str, dest: &Path) -> ProviderResult<()> {
            tokio::fs::write(dest, b"clip")
                .await
                .map_err(|e| ProviderError::transient(e.to_string()))
        }
    }

    fn client_for(server: &MockServer) -> WanVideoClient {
        WanVideoClient::new(server.uri(), "key-1", "wan2.2-i2v-plus", Arc::new(NullStorage))
    }

    #[tokio::test]
    async fn submit_stages_keyframe_and_returns_task_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/services/aigc/video-generation/video-synthesis"))
            .and(header("X-DashScope-Async", "enable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": { "task_id": "task-42", "task_status": "PENDING" },
                "request_id": "req-1"
            })))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let keyframe = dir.path().join("shot_01_keyframe.png");
        std::fs::write(&keyframe, b"png").unwrap();

        let ack = client_for(&server)
            .submit(&VideoJobSpec {
                keyframe,
                prompt: "slow push in".into(),
                audio_url: None,
                host: None,
            })
            .await
            .unwrap();
        assert_eq!(ack.job_id, "task-42");
    }

    #[tokio::test]
    async fn poll_maps_running_and_succeeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/task-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {
                    "task_id": "task-42",
                    "task_status": "SUCCEEDED",
                    "video_url": "https://cdn.example/out.mp4"
                }
            })))
            .mount(&server)
            .await;

        let poll = client_for(&server).poll("task-42").await.unwrap();
        assert_eq!(poll.phase, JobPhase::Succeeded);
        assert_eq!(poll.result_url.as_deref(), Some("https://cdn.example/out.mp4"));
    }

    #[tokio::test]
    async fn poll_maps_failure_with_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/task-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": {
                    "task_id": "task-9",
                    "task_status": "FAILED",
                    "message": "input image rejected"
                }
            })))
            .mount(&server)
            .await;

        let poll = client_for(&server).poll("task-9").await.unwrap();
        assert_eq!(poll.phase, JobPhase::Failed);
        assert_eq!(poll.message.as_deref(), Some("input image rejected"));
    }

    #[tokio::test]
    async fn rejected_submission_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "InvalidParameter",
                "message": "img_url is not reachable"
            })))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let keyframe = dir.path().join("k.png");
        std::fs::write(&keyframe, b"png").unwrap();

        let err = client_for(&server)
            .submit(&VideoJobSpec {
                keyframe,
                prompt: "pan left".into(),
                audio_url: None,
                host: None,
            })
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
