//! Request/response schemas for the exposed pipeline operations.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::Operation;
use crate::shot::Shot;

/// A required identifier is missing or unrecoverable from the request.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateStoryboardRequest {
    pub operation_id: String,
    pub story_id: String,
    pub user_id: String,
    pub display_name: String,
    pub script_content: String,
    pub style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateStoryboardResponse {
    pub operation: Operation,
    pub shots: Vec<Shot>,
}

/// Regeneration request. Absent fields keep the persisted values;
/// only `detail` and the keyframe are intended to change.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RegenerateShotRequest {
    pub operation_id: String,
    pub story_id: String,
    pub shot_id: String,
    pub user_id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    /// Legacy alias for `detail` accepted from older clients.
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub narration: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
}

impl RegenerateShotRequest {
    /// The detail text to regenerate from, preferring `detail` over
    /// the legacy `prompt` alias.
    pub fn detail_text(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .or(self.prompt.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RegenerateShotResponse {
    pub operation: Operation,
    pub shot: Shot,
}

/// Render request. Ids may arrive flat, nested in `operation`, or —
/// for older clients — only recoverable from a shot's `image_url`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderVideoRequest {
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub story_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub operation: Option<Operation>,
    #[serde(default)]
    pub shots: Option<Vec<Shot>>,
}

impl RenderVideoRequest {
    pub fn resolve_operation_id(&self) -> Result<String, ValidationError> {
        if let Some(id) = self.operation_id.as_deref().filter(|s| !s.is_empty()) {
            return Ok(id.to_string());
        }
        if let Some(op) = &self.operation {
            if !op.operation_id.is_empty() {
                return Ok(op.operation_id.clone());
            }
        }
        Err(ValidationError(
            "operation_id or operation.operation_id is required".into(),
        ))
    }

    pub fn resolve_story_id(&self) -> Result<String, ValidationError> {
        if let Some(id) = self.story_id.as_deref().filter(|s| !s.is_empty()) {
            return Ok(id.to_string());
        }
        if let Some(id) = self
            .first_image_url()
            .and_then(|url| path_segment_after(url, "stories/"))
        {
            return Ok(id);
        }
        Err(ValidationError(
            "story_id is required or must be recoverable from a shot image_url".into(),
        ))
    }

    pub fn resolve_user_id(&self) -> Result<String, ValidationError> {
        if let Some(id) = self.user_id.as_deref().filter(|s| !s.is_empty()) {
            return Ok(id.to_string());
        }
        if let Some(id) = self
            .first_image_url()
            .and_then(|url| path_segment_after(url, "users/"))
        {
            return Ok(id);
        }
        Err(ValidationError(
            "user_id is required or must be recoverable from a shot image_url".into(),
        ))
    }

    fn first_image_url(&self) -> Option<&str> {
        self.shots
            .as_ref()?
            .first()?
            .image_url
            .as_deref()
    }
}

/// Extract the path segment following `marker` from a URL whose
/// object key may be percent-encoded (`%2F` separators).
fn path_segment_after(url: &str, marker: &str) -> Option<String> {
    let decoded = url.replace("%2F", "/").replace("%2f", "/");
    let start = decoded.find(marker)? + marker.len();
    let rest = &decoded[start..];
    let end = rest
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let segment = &rest[..end];
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderVideoResponse {
    pub operation: Operation,
    pub video_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationStatus;

    fn shot_with_url(url: &str) -> Shot {
        Shot {
            id: "shot_01".into(),
            sequence: 1,
            subject: None,
            detail: None,
            camera: None,
            narration: None,
            tone: None,
            image_url: Some(url.into()),
            audio_url: None,
            video_url: None,
        }
    }

    #[test]
    fn flat_ids_win() {
        let req = RenderVideoRequest {
            operation_id: Some("op-1".into()),
            story_id: Some("story-001".into()),
            user_id: Some("u-1".into()),
            operation: None,
            shots: None,
        };
        assert_eq!(req.resolve_operation_id().unwrap(), "op-1");
        assert_eq!(req.resolve_story_id().unwrap(), "story-001");
        assert_eq!(req.resolve_user_id().unwrap(), "u-1");
    }

    #[test]
    fn nested_operation_id_is_accepted() {
        let req = RenderVideoRequest {
            operation_id: None,
            story_id: Some("story-001".into()),
            user_id: Some("u-1".into()),
            operation: Some(Operation::new("op-2", OperationStatus::Pending)),
            shots: None,
        };
        assert_eq!(req.resolve_operation_id().unwrap(), "op-2");
    }

    #[test]
    fn ids_recovered_from_image_url() {
        let req = RenderVideoRequest {
            operation_id: Some("op-1".into()),
            story_id: None,
            user_id: None,
            operation: None,
            shots: Some(vec![shot_with_url(
                "https://cdn.example.com/users/u-42/stories/story-007/keyframes/shot_01_keyframe.png?sig=abc",
            )]),
        };
        assert_eq!(req.resolve_user_id().unwrap(), "u-42");
        assert_eq!(req.resolve_story_id().unwrap(), "story-007");
    }

    #[test]
    fn ids_recovered_from_percent_encoded_url() {
        let req = RenderVideoRequest {
            operation_id: Some("op-1".into()),
            story_id: None,
            user_id: None,
            operation: None,
            shots: Some(vec![shot_with_url(
                "https://cdn.example.com/bucket/users%2Fu-9%2Fstories%2Fstory-003%2Fk.png",
            )]),
        };
        assert_eq!(req.resolve_user_id().unwrap(), "u-9");
        assert_eq!(req.resolve_story_id().unwrap(), "story-003");
    }

    #[test]
    fn missing_operation_id_is_a_validation_error() {
        let req = RenderVideoRequest {
            operation_id: None,
            story_id: None,
            user_id: None,
            operation: None,
            shots: None,
        };
        assert!(req.resolve_operation_id().is_err());
        assert!(req.resolve_story_id().is_err());
    }

    #[test]
    fn regenerate_prefers_detail_over_prompt_alias() {
        let mut req = RegenerateShotRequest {
            operation_id: "op".into(),
            story_id: "s".into(),
            shot_id: "shot_01".into(),
            user_id: "u".into(),
            subject: None,
            detail: Some("new detail".into()),
            prompt: Some("legacy prompt".into()),
            camera: None,
            narration: None,
            tone: None,
        };
        assert_eq!(req.detail_text(), Some("new detail"));
        req.detail = None;
        assert_eq!(req.detail_text(), Some("legacy prompt"));
        req.prompt = Some("  ".into());
        assert_eq!(req.detail_text(), None);
    }
}
