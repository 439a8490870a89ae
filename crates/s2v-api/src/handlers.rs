//! Request handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use s2v_models::{
    CreateStoryboardRequest, CreateStoryboardResponse, Operation, RegenerateShotRequest,
    RegenerateShotResponse, RenderVideoRequest, RenderVideoResponse,
};
use s2v_state::StateError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Create a story and generate its storyboard with keyframes.
pub async fn create_storyboard(
    State(state): State<AppState>,
    Json(req): Json<CreateStoryboardRequest>,
) -> ApiResult<Json<CreateStoryboardResponse>> {
    info!(user = %req.user_id, story = %req.story_id, "Storyboard requested");
    let response = s2v_engine::create_storyboard(&state.engine, &req).await?;
    Ok(Json(response))
}

/// Regenerate a single shot's keyframe.
pub async fn regenerate_shot(
    State(state): State<AppState>,
    Json(req): Json<RegenerateShotRequest>,
) -> ApiResult<Json<RegenerateShotResponse>> {
    info!(user = %req.user_id, shot = %req.shot_id, "Shot regeneration requested");
    let response = s2v_engine::regenerate_shot(&state.engine, &req).await?;
    Ok(Json(response))
}

/// Render the full video for a story.
pub async fn render_video(
    State(state): State<AppState>,
    Json(req): Json<RenderVideoRequest>,
) -> ApiResult<Json<RenderVideoResponse>> {
    let response = s2v_engine::render_video(&state.engine, &req).await?;
    Ok(Json(response))
}

/// Fetch the persisted state of one operation.
pub async fn get_operation(
    State(state): State<AppState>,
    Path((user_id, operation_id)): Path<(String, String)>,
) -> ApiResult<Json<Operation>> {
    let operation = state
        .engine
        .repo
        .load_operation(&user_id, &operation_id)
        .await
        .map_err(|e| match e {
            StateError::NotFound(_) => {
                ApiError::not_found(format!("operation {operation_id} not found"))
            }
            other => ApiError::internal(other.to_string()),
        })?;
    Ok(Json(operation))
}
