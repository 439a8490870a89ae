//! Local ComfyUI image-to-video backend.
//!
//! Each pooled host runs one workflow at a time. A job is pinned to the
//! host that accepted it: the prompt id alone is meaningless on any other
//! host, so the job handle carries the host base URL.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    JobPhase, JobPoll, ProviderError, ProviderResult, SubmitAck, VideoJobClient, VideoJobSpec,
};
use crate::error::{EngineError, EngineResult};

/// Node ids in the workflow graph that the client rewrites per job.
#[derive(Debug, Clone)]
pub struct WorkflowNodes {
    pub prompt: String,
    pub image: String,
    pub seed: String,
    pub output: String,
}

impl Default for WorkflowNodes {
    fn default() -> Self {
        Self {
            prompt: "44".to_string(),
            image: "80".to_string(),
            seed: "127".to_string(),
            output: "102".to_string(),
        }
    }
}

/// Client for pooled local ComfyUI hosts.
pub struct ComfyVideoClient {
    workflow: Value,
    nodes: WorkflowNodes,
    concurrency: usize,
    client: Client,
}

impl ComfyVideoClient {
    pub fn new(workflow: Value, nodes: WorkflowNodes, concurrency: usize) -> Self {
        Self {
            workflow,
            nodes,
            concurrency: concurrency.max(1),
            client: Client::new(),
        }
    }

    pub fn from_env(concurrency: usize) -> EngineResult<Self> {
        let workflow_path = std::env::var("COMFY_WORKFLOW_PATH")
            .map_err(|_| EngineError::config("COMFY_WORKFLOW_PATH not set"))?;
        let text = std::fs::read_to_string(&workflow_path)
            .map_err(|e| EngineError::config(format!("read {workflow_path}: {e}")))?;
        let workflow: Value = serde_json::from_str(&text)
            .map_err(|e| EngineError::config(format!("parse {workflow_path}: {e}")))?;
        Ok(Self::new(workflow, WorkflowNodes::default(), concurrency))
    }

    fn prepare_workflow(&self, prompt: &str, image_name: &str) -> Value {
        let mut workflow = self.workflow.clone();
        workflow[&self.nodes.prompt]["inputs"]["text"] = json!(prompt);
        workflow[&self.nodes.image]["inputs"]["image"] = json!(image_name);
        workflow[&self.nodes.seed]["inputs"]["seed"] =
            json!(chrono::Utc::now().timestamp_micros().unsigned_abs() % 1_000_000_007);
        workflow[&self.nodes.output]["inputs"]["filename_prefix"] =
            json!(format!("s2v_{}", Uuid::new_v4()));
        workflow
    }

    async fn upload_keyframe(&self, host: &str, keyframe: &Path) -> ProviderResult<String> {
        let bytes = tokio::fs::read(keyframe)
            .await
            .map_err(|e| ProviderError::transient(format!("read keyframe: {e}")))?;
        let name = format!("{}.png", Uuid::new_v4());
        let part = Part::bytes(bytes)
            .file_name(name.clone())
            .mime_str("image/png")
            .map_err(|e| ProviderError::malformed(format!("keyframe mime: {e}")))?;
        let form = Form::new().part("image", part).text("overwrite", "true");

        let response = self
            .client
            .post(format!("{host}/upload/image"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }
        Ok(name)
    }
}

/// Split a job handle back into host and prompt id.
fn split_job_id(job_id: &str) -> ProviderResult<(&str, &str)> {
    job_id
        .split_once('|')
        .ok_or_else(|| ProviderError::fatal(format!("malformed job handle: {job_id}")))
}

/// Find the first rendered file in a history entry's outputs.
fn find_output(outputs: &Value) -> Option<(String, String)> {
    let nodes = outputs.as_object()?;
    for node in nodes.values() {
        for kind in ["videos", "gifs", "images"] {
            if let Some(files) = node.get(kind).and_then(Value::as_array) {
                if let Some(file) = files.first() {
                    let filename = file.get("filename")?.as_str()?.to_string();
                    let subfolder = file
                        .get("subfolder")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    return Some((filename, subfolder));
                }
            }
        }
    }
    None
}

#[async_trait::async_trait]
impl VideoJobClient for ComfyVideoClient {
    async fn submit(&self, spec: &VideoJobSpec) -> ProviderResult<SubmitAck> {
        let host = spec
            .host
            .as_deref()
            .ok_or_else(|| ProviderError::fatal("local backend needs a leased host"))?;

        let image_name = self.upload_keyframe(host, &spec.keyframe).await?;
        let workflow = self.prepare_workflow(&spec.prompt, &image_name);

        let response = self
            .client
            .post(format!("{host}/prompt"))
            .json(&json!({ "prompt": workflow }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let raw: Value = response.json().await?;
        let prompt_id = raw
            .get("prompt_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::malformed("queue ack carries no prompt id"))?;
        info!(host = host, prompt = prompt_id, "Workflow queued");
        Ok(SubmitAck {
            job_id: format!("{host}|{prompt_id}"),
            raw,
        })
    }

    async fn poll(&self, job_id: &str) -> ProviderResult<JobPoll> {
        let (host, prompt_id) = split_job_id(job_id)?;

        let response = self
            .client
            .get(format!("{host}/history/{prompt_id}"))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let raw: Value = response.json().await?;
        let entry = match raw.get(prompt_id) {
            Some(entry) => entry,
            // Not in history yet, still queued or executing.
            None => {
                return Ok(JobPoll {
                    phase: JobPhase::InProgress,
                    result_url: None,
                    message: None,
                    raw,
                })
            }
        };

        let status_str = entry
            .pointer("/status/status_str")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let completed = entry
            .pointer("/status/completed")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if status_str == "error" {
            let message = entry
                .pointer("/status/messages")
                .map(Value::to_string)
                .unwrap_or_else(|| "workflow execution failed".to_string());
            return Ok(JobPoll {
                phase: JobPhase::Failed,
                result_url: None,
                message: Some(message),
                raw,
            });
        }
        if !completed {
            return Ok(JobPoll {
                phase: JobPhase::InProgress,
                result_url: None,
                message: None,
                raw,
            });
        }

        // Completed. The output file can show up one poll after the
        // completion flag, so a missing file is not a failure.
        let result_url = entry
            .get("outputs")
            .and_then(|o| find_output(o))
            .map(|(filename, subfolder)| {
                format!("{host}/view?filename={filename}&subfolder={subfolder}&type=output")
            });
        debug!(prompt = prompt_id, found = result_url.is_some(), "Workflow completed");
        Ok(JobPoll {
            phase: JobPhase::Succeeded,
            result_url,
            message: None,
            raw,
        })
    }

    async fn download(&self, result_url: &str, dest: &Path) -> ProviderResult<()> {
        let response = self.client.get(result_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "clip download failed with HTTP {status}"
            )));
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::transient(format!("create clip dir: {e}")))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ProviderError::transient(format!("write clip file: {e}")))?;
        Ok(())
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }
}
