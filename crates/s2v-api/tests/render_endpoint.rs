//! The render endpoint holds its request open for the whole pipeline
//! run. A backend that needs minutes of polling must still come back
//! with a 200 and a terminal operation document.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tempfile::tempdir;
use tower::ServiceExt;

use s2v_api::{create_router, ApiConfig, AppState};
use s2v_engine::providers::{
    ClipMerger, ImageProvider, JobPhase, JobPoll, MediaStorage, ProviderError, ProviderResult,
    SpeechProvider, StoryboardProvider, SubmitAck, VideoJobClient, VideoJobSpec,
};
use s2v_engine::{create_storyboard, EngineConfig, EngineContext};
use s2v_models::{CreateStoryboardRequest, OperationStatus, ShotDraft};
use s2v_state::StoryRepository;

struct SingleShotStoryboard;

#[async_trait]
impl StoryboardProvider for SingleShotStoryboard {
    async fn generate_storyboard(&self, _styled_script: &str) -> ProviderResult<Vec<ShotDraft>> {
        Ok(vec![ShotDraft {
            sequence: Some(1),
            subject: Some("lighthouse".into()),
            detail: Some("waves at dusk".into()),
            camera: Some("fixed".into()),
            narration: Some("the light turns".into()),
            tone: Some("calm".into()),
        }])
    }
}

struct StubImages;

#[async_trait]
impl ImageProvider for StubImages {
    async fn generate_image(&self, _prompt: &str, dest: &Path) -> ProviderResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(dest, b"PNG")
            .await
            .map_err(|e| ProviderError::transient(e.to_string()))
    }
}

struct StubSpeech;

#[async_trait]
impl SpeechProvider for StubSpeech {
    async fn synthesize(&self, _text: &str, _tone: Option<&str>) -> ProviderResult<Vec<u8>> {
        Ok(b"MP3".to_vec())
    }
}

/// Clip backend that stays in progress for a fixed number of polls.
struct SlowVideo {
    polls_needed: u32,
    polls: AtomicU32,
}

#[async_trait]
impl VideoJobClient for SlowVideo {
    async fn submit(&self, _spec: &VideoJobSpec) -> ProviderResult<SubmitAck> {
        Ok(SubmitAck {
            job_id: "job-slow".into(),
            raw: json!({"job": "slow"}),
        })
    }

    async fn poll(&self, job_id: &str) -> ProviderResult<JobPoll> {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if seen < self.polls_needed {
            return Ok(JobPoll {
                phase: JobPhase::InProgress,
                result_url: None,
                message: None,
                raw: json!({"status": "RUNNING"}),
            });
        }
        Ok(JobPoll {
            phase: JobPhase::Succeeded,
            result_url: Some(format!("fake://{job_id}.mp4")),
            message: None,
            raw: json!({"status": "SUCCEEDED"}),
        })
    }

    async fn download(&self, _result_url: &str, dest: &Path) -> ProviderResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(dest, b"CLIP")
            .await
            .map_err(|e| ProviderError::transient(e.to_string()))
    }

    fn concurrency(&self) -> usize {
        1
    }
}

struct StubMedia;

#[async_trait]
impl MediaStorage for StubMedia {
    async fn upload(&self, key: &str, _path: &Path, _ct: &str) -> ProviderResult<String> {
        Ok(format!("https://media.test/{key}"))
    }

    async fn download_url(&self, _url: &str, dest: &Path) -> ProviderResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(dest, b"PNG")
            .await
            .map_err(|e| ProviderError::transient(e.to_string()))
    }
}

struct StubMerger;

#[async_trait]
impl ClipMerger for StubMerger {
    async fn concat(
        &self,
        clips: &[PathBuf],
        list_file: &Path,
        output: &Path,
    ) -> s2v_engine::EngineResult<()> {
        let mut list = String::new();
        let mut merged = Vec::new();
        for clip in clips {
            list.push_str(&format!("file '{}'\n", clip.display()));
            merged.extend(tokio::fs::read(clip).await?);
        }
        tokio::fs::write(list_file, list).await?;
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

fn slow_ctx(dir: &Path, polls_needed: u32) -> EngineContext {
    let mut config = EngineConfig::default();
    config.data_dir = dir.to_path_buf();
    EngineContext {
        config,
        repo: StoryRepository::new(dir),
        storyboard: Arc::new(SingleShotStoryboard),
        images: Arc::new(StubImages),
        speech: Arc::new(StubSpeech),
        video: Arc::new(SlowVideo {
            polls_needed,
            polls: AtomicU32::new(0),
        }),
        media: Arc::new(StubMedia),
        merger: Arc::new(StubMerger),
        host_pool: None,
    }
}

#[tokio::test(start_paused = true)]
async fn long_render_resolves_with_a_terminal_operation() {
    let dir = tempdir().unwrap();
    let engine = slow_ctx(dir.path(), 90);
    let repo = engine.repo.clone();

    create_storyboard(
        &engine,
        &CreateStoryboardRequest {
            operation_id: "op-create".into(),
            story_id: "s1".into(),
            user_id: "u1".into(),
            display_name: "The Lighthouse".into(),
            script_content: "a lighthouse keeps watch".into(),
            style: "ink wash".into(),
        },
    )
    .await
    .unwrap();

    let app = create_router(AppState::new(ApiConfig::default(), Arc::new(engine)));
    let body = json!({
        "operation_id": "op-render",
        "story_id": "s1",
        "user_id": "u1",
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/video/render")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let started = tokio::time::Instant::now();
    let response = app.oneshot(request).await.unwrap();

    // 90 polls at the 2s cadence is minutes of wall time. Nothing in
    // the middleware stack may cut the request off before then.
    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_secs(120));

    let op = repo.load_operation("u1", "op-render").await.unwrap();
    assert_eq!(op.status, OperationStatus::Success);
}
