//! Pipeline stage sequencer.
//!
//! Drives the three exposed operations end to end: storyboard creation,
//! single-shot regeneration, and the full render. Stages run strictly in
//! order; within a stage, shots fan out under a concurrency bound and a
//! failed shot is dropped from later stages instead of aborting them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use s2v_models::{
    CreateStoryboardRequest, CreateStoryboardResponse, Operation, OperationStatus,
    RegenerateShotRequest, RegenerateShotResponse, RenderVideoRequest, RenderVideoResponse, Shot,
    Story, ValidationError,
};
use s2v_state::{StoryLayout, StoryRepository};
use s2v_storage::{OssClient, OssConfig};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fanout::{run_bounded, tally};
use crate::merge::FfmpegMerger;
use crate::poller::{drive_job, ResponseArchive};
use crate::pool::HostPool;
use crate::providers::comfy::ComfyVideoClient;
use crate::providers::image::ImageGenClient;
use crate::providers::llm::ChatStoryboardClient;
use crate::providers::storage::OssMediaStorage;
use crate::providers::tts::TtsClient;
use crate::providers::video::WanVideoClient;
use crate::providers::{
    ClipMerger, ImageProvider, MediaStorage, SpeechProvider, StoryboardProvider, VideoJobClient,
    VideoJobSpec,
};
use crate::retry::retry_async;

/// Everything the sequencer needs to run a pipeline.
pub struct EngineContext {
    pub config: EngineConfig,
    pub repo: StoryRepository,
    pub storyboard: Arc<dyn StoryboardProvider>,
    pub images: Arc<dyn ImageProvider>,
    pub speech: Arc<dyn SpeechProvider>,
    pub video: Arc<dyn VideoJobClient>,
    pub media: Arc<dyn MediaStorage>,
    pub merger: Arc<dyn ClipMerger>,
    /// Present only for pooled local backends.
    pub host_pool: Option<HostPool>,
}

impl EngineContext {
    /// Wire up the production context from environment variables.
    ///
    /// `VIDEO_BACKEND` selects the clip backend: `remote` (default) for
    /// the hosted task API, `local` for pooled ComfyUI hosts listed in
    /// `COMFY_HOSTS`.
    pub fn from_env() -> EngineResult<Self> {
        let config = EngineConfig::from_env()?;
        let repo = StoryRepository::new(&config.data_dir);
        let media: Arc<dyn MediaStorage> =
            Arc::new(OssMediaStorage::new(OssClient::new(OssConfig::from_env()?)));

        let backend =
            std::env::var("VIDEO_BACKEND").unwrap_or_else(|_| "remote".to_string());
        let (video, host_pool): (Arc<dyn VideoJobClient>, Option<HostPool>) =
            match backend.as_str() {
                "local" => {
                    let hosts = std::env::var("COMFY_HOSTS").map_err(|_| {
                        EngineError::config("COMFY_HOSTS not set for the local backend")
                    })?;
                    let hosts: Vec<String> = hosts
                        .split(',')
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(str::to_string)
                        .collect();
                    let pool = HostPool::new(hosts)?;
                    let client = ComfyVideoClient::from_env(pool.size())?;
                    (Arc::new(client), Some(pool))
                }
                "remote" => (
                    Arc::new(WanVideoClient::from_env(Arc::clone(&media))?),
                    None,
                ),
                other => {
                    return Err(EngineError::config(format!(
                        "unknown VIDEO_BACKEND: {other}"
                    )))
                }
            };

        Ok(Self {
            config,
            repo,
            storyboard: Arc::new(ChatStoryboardClient::from_env()?),
            images: Arc::new(ImageGenClient::from_env()?),
            speech: Arc::new(TtsClient::from_env()?),
            video,
            media,
            merger: Arc::new(FfmpegMerger::new()),
            host_pool,
        })
    }

    /// Clip fan-out width: the pool size when hosts are pooled, the
    /// backend's ceiling otherwise.
    fn clip_concurrency(&self) -> usize {
        match &self.host_pool {
            Some(pool) => pool.size(),
            None => self.video.concurrency(),
        }
    }
}

/// Create a story, generate its storyboard, and render all keyframes.
pub async fn create_storyboard(
    ctx: &EngineContext,
    req: &CreateStoryboardRequest,
) -> EngineResult<CreateStoryboardResponse> {
    let layout = ctx.repo.layout(&req.user_id, &req.story_id);
    ctx.repo
        .update_operation(&req.user_id, &req.operation_id, OperationStatus::Running, None)
        .await?;

    let story = Story::new(
        &req.story_id,
        &req.display_name,
        &req.style,
        &req.script_content,
    );
    ctx.repo.upsert_story(&req.user_id, &story).await?;

    let styled = story.styled_script();
    let drafts = match retry_async(&ctx.config.storyboard_retry, || {
        ctx.storyboard.generate_storyboard(&styled)
    })
    .await
    .into_result()
    {
        Ok(drafts) => drafts,
        Err(e) => {
            let detail = format!("storyboard generation failed: {e}");
            ctx.repo
                .update_operation(
                    &req.user_id,
                    &req.operation_id,
                    OperationStatus::Failed,
                    Some(&detail),
                )
                .await?;
            return Err(e.into());
        }
    };

    let mut shots: Vec<Shot> = drafts
        .into_iter()
        .enumerate()
        .map(|(i, draft)| draft.into_shot(i))
        .collect();
    info!(
        user = %req.user_id,
        story = %req.story_id,
        shots = shots.len(),
        "Storyboard generated"
    );

    let outcomes = run_bounded(ctx.config.keyframe_concurrency, shots.clone(), |shot| {
        generate_keyframe(ctx, &layout, shot, Some(story.style.as_str()))
    })
    .await;
    let (succeeded, failed) = tally(&outcomes);
    info!(succeeded, failed, "Keyframe stage finished");

    for ((_, outcome), shot) in outcomes.into_iter().zip(shots.iter_mut()) {
        match outcome {
            Ok(url) => shot.image_url = Some(url),
            Err(e) => warn!(shot = %shot.id, error = %e, "Keyframe generation failed"),
        }
    }

    ctx.repo.save_shots(&req.user_id, &req.story_id, &shots).await?;
    ctx.repo
        .update_operation(&req.user_id, &req.operation_id, OperationStatus::Success, None)
        .await?;

    Ok(CreateStoryboardResponse {
        operation: Operation::new(&req.operation_id, OperationStatus::Success),
        shots,
    })
}

/// Regenerate one shot's keyframe with updated fields, leaving every
/// field the request does not carry untouched.
pub async fn regenerate_shot(
    ctx: &EngineContext,
    req: &RegenerateShotRequest,
) -> EngineResult<RegenerateShotResponse> {
    let layout = ctx.repo.layout(&req.user_id, &req.story_id);
    ctx.repo
        .update_operation(&req.user_id, &req.operation_id, OperationStatus::Running, None)
        .await?;

    let mut shots = ctx.repo.load_shots(&req.user_id, &req.story_id).await?;
    let existing = shots.iter().find(|s| s.id == req.shot_id).cloned();
    if existing.is_none() {
        warn!(shot = %req.shot_id, "Regenerating a shot with no persisted record");
    }

    let mut shot = Shot {
        id: req.shot_id.clone(),
        sequence: existing.as_ref().map(|s| s.sequence).unwrap_or(0),
        subject: req
            .subject
            .clone()
            .or_else(|| existing.as_ref().and_then(|s| s.subject.clone())),
        detail: req
            .detail_text()
            .map(str::to_string)
            .or_else(|| existing.as_ref().and_then(|s| s.detail.clone())),
        camera: req
            .camera
            .clone()
            .or_else(|| existing.as_ref().and_then(|s| s.camera.clone())),
        narration: req
            .narration
            .clone()
            .or_else(|| existing.as_ref().and_then(|s| s.narration.clone())),
        tone: req
            .tone
            .clone()
            .or_else(|| existing.as_ref().and_then(|s| s.tone.clone())),
        image_url: existing.as_ref().and_then(|s| s.image_url.clone()),
        audio_url: existing.as_ref().and_then(|s| s.audio_url.clone()),
        video_url: existing.as_ref().and_then(|s| s.video_url.clone()),
    };

    let style = ctx
        .repo
        .load_story(&req.user_id, &req.story_id)
        .await
        .ok()
        .map(|s| s.style);
    let prompt = keyframe_prompt(&shot, style.as_deref());
    let filename = if shot.sequence > 0 {
        shot.keyframe_filename()
    } else {
        format!("{}_keyframe.png", shot.id)
    };
    let dest = layout.keyframes_dir().join(&filename);

    if let Err(e) = retry_async(&ctx.config.keyframe_retry, || {
        ctx.images.generate_image(&prompt, &dest)
    })
    .await
    .into_result()
    {
        let detail = format!("keyframe regeneration failed: {e}");
        ctx.repo
            .update_operation(
                &req.user_id,
                &req.operation_id,
                OperationStatus::Failed,
                Some(&detail),
            )
            .await?;
        return Err(e.into());
    }

    let key = layout.object_key("keyframes", &filename);
    shot.image_url = Some(match ctx.media.upload(&key, &dest, "image/png").await {
        Ok(url) => url,
        Err(e) => {
            warn!(shot = %shot.id, error = %e, "Keyframe upload failed, serving local path");
            layout.static_url("keyframes", &filename)
        }
    });

    match shots.iter_mut().find(|s| s.id == shot.id) {
        Some(slot) => *slot = shot.clone(),
        None => shots.push(shot.clone()),
    }
    ctx.repo.upsert_shot(&req.user_id, &req.story_id, &shot).await?;
    ctx.repo.save_shots(&req.user_id, &req.story_id, &shots).await?;
    ctx.repo
        .update_operation(&req.user_id, &req.operation_id, OperationStatus::Success, None)
        .await?;

    Ok(RegenerateShotResponse {
        operation: Operation::new(&req.operation_id, OperationStatus::Success),
        shot,
    })
}

/// Render the full video: narration, clips, concatenation, upload.
///
/// Shot-level failures are absorbed; the render fails only when no clip
/// at all materializes or the final assembly step breaks. Pipeline-level
/// failures resolve to an `Ok` response carrying a `Failed` operation,
/// so callers always learn the terminal state.
pub async fn render_video(
    ctx: &EngineContext,
    req: &RenderVideoRequest,
) -> EngineResult<RenderVideoResponse> {
    let operation_id = req.resolve_operation_id()?;
    let user_id = req.resolve_user_id()?;
    let story_id = req.resolve_story_id()?;
    let layout = ctx.repo.layout(&user_id, &story_id);
    let fallback_url = layout.static_url("clips", "final.mp4");

    if let Some(shots) = &req.shots {
        ctx.repo.save_shots(&user_id, &story_id, shots).await?;
    }
    ctx.repo
        .update_operation(&user_id, &operation_id, OperationStatus::Running, None)
        .await?;

    let mut shots = ctx.repo.load_shots(&user_id, &story_id).await?;
    if shots.is_empty() {
        return finish_failed(
            ctx,
            &user_id,
            &operation_id,
            "no shots available for rendering",
            fallback_url,
        )
        .await;
    }
    shots.sort_by_key(|s| s.sequence);

    // Narration stage. A shot without narration text is skipped, a
    // failed synthesis leaves the clip silent.
    let outcomes = run_bounded(ctx.config.tts_concurrency, shots.clone(), |shot| {
        synthesize_narration(ctx, &layout, shot)
    })
    .await;
    let (succeeded, failed) = tally(&outcomes);
    info!(succeeded, failed, "Narration stage finished");
    for ((_, outcome), shot) in outcomes.into_iter().zip(shots.iter_mut()) {
        match outcome {
            Ok(Some(url)) => shot.audio_url = Some(url),
            Ok(None) => debug!(shot = %shot.id, "No narration for shot"),
            Err(e) => {
                warn!(shot = %shot.id, error = %e, "Narration synthesis failed, clip will be silent")
            }
        }
    }
    ctx.repo.save_shots(&user_id, &story_id, &shots).await?;

    // Clip stage.
    let outcomes = run_bounded(ctx.clip_concurrency(), shots.clone(), |shot| {
        generate_clip(ctx, &layout, shot)
    })
    .await;
    let (succeeded, failed) = tally(&outcomes);
    info!(succeeded, failed, "Clip stage finished");
    for ((_, outcome), shot) in outcomes.into_iter().zip(shots.iter_mut()) {
        match outcome {
            Ok(()) => {
                shot.video_url = Some(layout.static_url("clips", &shot.clip_filename()));
            }
            Err(e) => warn!(shot = %shot.id, error = %e, "Clip generation failed"),
        }
    }
    for shot in &shots {
        ctx.repo.upsert_shot(&user_id, &story_id, shot).await?;
    }
    ctx.repo.save_shots(&user_id, &story_id, &shots).await?;

    // Collect whatever materialized, in sequence order.
    let mut clips: Vec<PathBuf> = Vec::new();
    for shot in &shots {
        let path = layout.clip_path(shot.sequence);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            clips.push(path);
        }
    }
    if clips.is_empty() {
        return finish_failed(
            ctx,
            &user_id,
            &operation_id,
            "no clips were produced for concatenation",
            fallback_url,
        )
        .await;
    }

    let final_path = layout.final_video_path();
    if let Err(e) = ctx
        .merger
        .concat(&clips, &layout.concat_list_path(), &final_path)
        .await
    {
        return finish_failed(
            ctx,
            &user_id,
            &operation_id,
            &format!("final assembly failed: {e}"),
            fallback_url,
        )
        .await;
    }

    let video_url = match ctx
        .media
        .upload(
            &layout.object_key("clips", "final.mp4"),
            &final_path,
            "video/mp4",
        )
        .await
    {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Final video upload failed, serving local path");
            fallback_url
        }
    };

    ctx.repo
        .update_story_video_url(&user_id, &story_id, &video_url)
        .await?;
    ctx.repo
        .update_operation(&user_id, &operation_id, OperationStatus::Success, None)
        .await?;
    info!(user = %user_id, story = %story_id, clips = clips.len(), "Render finished");

    Ok(RenderVideoResponse {
        operation: Operation::new(&operation_id, OperationStatus::Success),
        video_url,
    })
}

async fn finish_failed(
    ctx: &EngineContext,
    user_id: &str,
    operation_id: &str,
    detail: &str,
    video_url: String,
) -> EngineResult<RenderVideoResponse> {
    error!(operation = operation_id, detail = detail, "Render failed");
    ctx.repo
        .update_operation(user_id, operation_id, OperationStatus::Failed, Some(detail))
        .await?;
    Ok(RenderVideoResponse {
        operation: Operation::failed(operation_id, detail),
        video_url,
    })
}

/// Generate one keyframe and upload it, returning the keyframe URL.
/// An upload failure degrades to the locally served path.
async fn generate_keyframe(
    ctx: &EngineContext,
    layout: &StoryLayout,
    shot: Shot,
    style: Option<&str>,
) -> EngineResult<String> {
    let prompt = keyframe_prompt(&shot, style);
    let dest = layout.keyframe_path(shot.sequence);

    retry_async(&ctx.config.keyframe_retry, || {
        ctx.images.generate_image(&prompt, &dest)
    })
    .await
    .into_result()?;

    let filename = shot.keyframe_filename();
    let key = layout.object_key("keyframes", &filename);
    match ctx.media.upload(&key, &dest, "image/png").await {
        Ok(url) => Ok(url),
        Err(e) => {
            warn!(shot = %shot.id, error = %e, "Keyframe upload failed, serving local path");
            Ok(layout.static_url("keyframes", &filename))
        }
    }
}

/// Synthesize one shot's narration. `Ok(None)` means the shot has no
/// narration text and was skipped.
async fn synthesize_narration(
    ctx: &EngineContext,
    layout: &StoryLayout,
    shot: Shot,
) -> EngineResult<Option<String>> {
    if !shot.has_narration() {
        return Ok(None);
    }
    let text = shot.narration.as_deref().unwrap_or_default().trim();

    let audio = retry_async(&ctx.config.tts_retry, || {
        ctx.speech.synthesize(text, shot.tone.as_deref())
    })
    .await
    .into_result()?;

    let filename = shot.audio_filename(layout.user_id(), layout.story_id());
    let path = layout.audio_path(&filename);
    tokio::fs::create_dir_all(layout.audio_dir()).await?;
    tokio::fs::write(&path, &audio).await?;

    let key = layout.object_key("audio", &filename);
    match ctx.media.upload(&key, &path, "audio/mpeg").await {
        Ok(url) => Ok(Some(url)),
        Err(e) => {
            warn!(shot = %shot.id, error = %e, "Audio upload failed, serving local path");
            Ok(Some(layout.static_url("audio", &filename)))
        }
    }
}

/// Generate one shot's clip: ensure the keyframe, lease a host when the
/// backend is pooled, submit, poll to completion, download. The whole
/// unit retries as one, with a fresh trace id per attempt.
async fn generate_clip(ctx: &EngineContext, layout: &StoryLayout, shot: Shot) -> EngineResult<()> {
    let keyframe = layout.keyframe_path(shot.sequence);
    let dest = layout.clip_path(shot.sequence);
    let prompt = clip_prompt(&shot);

    let shot = &shot;
    let keyframe = &keyframe;
    let dest = &dest;
    let prompt = &prompt;

    retry_async(&ctx.config.clip_retry, || async move {
        ensure_keyframe(ctx, shot, keyframe).await?;

        let lease = match &ctx.host_pool {
            Some(pool) => Some(pool.acquire().await?),
            None => None,
        };
        let spec = VideoJobSpec {
            keyframe: keyframe.clone(),
            prompt: prompt.clone(),
            audio_url: shot.audio_url.clone(),
            host: lease.as_ref().map(|l| l.host().to_string()),
        };

        let trace = format!("{}_{}", shot.id, Uuid::new_v4());
        let archive = ResponseArchive::new(
            ctx.repo.clone(),
            layout.user_id(),
            layout.story_id(),
            trace,
            "video",
        );

        let ack = ctx.video.submit(&spec).await?;
        archive.record_submit(&ack.raw).await;
        let job_id = ack.job_id.as_str();
        let success = drive_job(&ctx.config.poll, &archive, || ctx.video.poll(job_id)).await?;
        ctx.video.download(&success.result_url, dest).await?;
        Ok::<(), EngineError>(())
    })
    .await
    .into_result()
}

/// Make sure the shot's keyframe exists locally, recovering it from its
/// uploaded URL when the file is gone.
async fn ensure_keyframe(ctx: &EngineContext, shot: &Shot, keyframe: &Path) -> EngineResult<()> {
    if tokio::fs::try_exists(keyframe).await.unwrap_or(false) {
        return Ok(());
    }
    let url = shot.image_url.as_deref().ok_or_else(|| {
        EngineError::Validation(ValidationError(format!(
            "shot {} has no keyframe on disk and no keyframe URL",
            shot.id
        )))
    })?;
    warn!(shot = %shot.id, "Keyframe missing locally, recovering from URL");
    retry_async(&ctx.config.keyframe_recovery_retry, || {
        ctx.media.download_url(url, keyframe)
    })
    .await
    .into_result()?;
    Ok(())
}

fn keyframe_prompt(shot: &Shot, style: Option<&str>) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(style) = style.filter(|s| !s.is_empty()) {
        parts.push(format!("{style} style"));
    }
    if let Some(subject) = shot.subject.as_deref().filter(|s| !s.is_empty()) {
        parts.push(subject.to_string());
    }
    if let Some(detail) = shot.detail.as_deref().filter(|s| !s.is_empty()) {
        parts.push(detail.to_string());
    }
    if parts.is_empty() {
        "an establishing shot of the story".to_string()
    } else {
        parts.join(". ")
    }
}

fn clip_prompt(shot: &Shot) -> String {
    let detail = shot
        .detail
        .as_deref()
        .or(shot.subject.as_deref())
        .unwrap_or("a gentle cinematic motion");
    match shot.camera.as_deref().filter(|c| !c.is_empty()) {
        Some(camera) => format!("camera {camera}. {detail}"),
        None => detail.to_string(),
    }
}
