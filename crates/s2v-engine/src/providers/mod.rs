//! Clients for external generation services.
//!
//! Each stage of the pipeline talks to its backend through one of the
//! traits below, so the sequencer never depends on a concrete vendor and
//! tests can substitute scripted fakes.

mod error;
pub mod comfy;
pub mod image;
pub mod llm;
pub mod storage;
pub mod tts;
pub mod video;

pub use error::{ProviderError, ProviderResult};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use s2v_models::ShotDraft;

/// Phase of an asynchronous generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    InProgress,
    Succeeded,
    Failed,
}

/// One status check of an asynchronous job.
#[derive(Debug, Clone)]
pub struct JobPoll {
    pub phase: JobPhase,
    /// Where to fetch the finished artifact. May lag `Succeeded` by a
    /// poll cycle on some backends.
    pub result_url: Option<String>,
    /// Failure detail, when the backend reports one.
    pub message: Option<String>,
    /// Raw response payload, archived verbatim for diagnostics.
    pub raw: Value,
}

/// Inputs for one image-to-video job.
#[derive(Debug, Clone)]
pub struct VideoJobSpec {
    /// Local keyframe image driving the clip.
    pub keyframe: PathBuf,
    /// Motion/content prompt.
    pub prompt: String,
    /// Narration audio to bind to the clip, when present.
    pub audio_url: Option<String>,
    /// Backend host leased for this job. Set when the backend runs on a
    /// pooled local host, `None` for hosted APIs.
    pub host: Option<String>,
}

/// Submission acknowledgement for an asynchronous job.
#[derive(Debug, Clone)]
pub struct SubmitAck {
    /// Handle used for subsequent status checks.
    pub job_id: String,
    /// Raw acknowledgement payload.
    pub raw: Value,
}

/// Turns a styled script into a list of shot drafts.
#[async_trait]
pub trait StoryboardProvider: Send + Sync {
    async fn generate_storyboard(&self, styled_script: &str) -> ProviderResult<Vec<ShotDraft>>;
}

/// Generates a still image for a prompt and writes it to `dest`.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate_image(&self, prompt: &str, dest: &Path) -> ProviderResult<()>;
}

/// Synthesizes narration audio, returning encoded bytes.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn synthesize(&self, text: &str, tone: Option<&str>) -> ProviderResult<Vec<u8>>;
}

/// Asynchronous image-to-video backend: submit, poll, download.
#[async_trait]
pub trait VideoJobClient: Send + Sync {
    async fn submit(&self, spec: &VideoJobSpec) -> ProviderResult<SubmitAck>;

    async fn poll(&self, job_id: &str) -> ProviderResult<JobPoll>;

    async fn download(&self, result_url: &str, dest: &Path) -> ProviderResult<()>;

    /// How many jobs this backend can usefully run at once.
    fn concurrency(&self) -> usize;
}

/// Media artifact storage and retrieval.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Upload a local file under `key` and return its public URL.
    async fn upload(&self, key: &str, path: &Path, content_type: &str)
        -> ProviderResult<String>;

    /// Fetch an artifact by URL into a local file.
    async fn download_url(&self, url: &str, dest: &Path) -> ProviderResult<()>;
}

/// Concatenates finished clips into the final movie.
#[async_trait]
pub trait ClipMerger: Send + Sync {
    async fn concat(
        &self,
        clips: &[PathBuf],
        list_file: &Path,
        output: &Path,
    ) -> crate::error::EngineResult<()>;
}
