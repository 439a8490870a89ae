//! Shot records: the unit of work for every pipeline stage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One storyboard shot. Created during storyboard generation; artifact
/// URLs are filled in stage by stage and may be overwritten
/// independently by regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Shot {
    /// Stable id, e.g. `shot_03`.
    pub id: String,
    /// 1-based order within the story; names artifacts and orders the
    /// final concatenation.
    pub sequence: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Keyframe URL, set after keyframe generation + upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Narration audio URL; absent when the shot has no narration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Clip URL, set after clip generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl Shot {
    /// File name for the shot's keyframe image.
    pub fn keyframe_filename(&self) -> String {
        format!("shot_{:02}_keyframe.png", self.sequence)
    }

    /// File name for the shot's rendered clip.
    pub fn clip_filename(&self) -> String {
        format!("shot_{:02}.mp4", self.sequence)
    }

    /// File name for the shot's narration audio.
    pub fn audio_filename(&self, user_id: &str, story_id: &str) -> String {
        format!("{}-{}-{}.mp3", user_id, story_id, self.id)
    }

    /// True if the shot carries non-empty narration text.
    pub fn has_narration(&self) -> bool {
        self.narration
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false)
    }
}

/// A shot as produced by the storyboard LLM, before ids are assigned.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShotDraft {
    #[serde(default)]
    pub sequence: Option<u32>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub narration: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
}

impl ShotDraft {
    /// Materialize a draft into a shot record. `index` is the 0-based
    /// position in the draft list, used when the LLM omitted a
    /// sequence number.
    pub fn into_shot(self, index: usize) -> Shot {
        let sequence = self.sequence.unwrap_or(index as u32 + 1);
        Shot {
            id: format!("shot_{:02}", sequence),
            sequence,
            subject: self.subject,
            detail: self.detail,
            camera: self.camera,
            narration: self.narration,
            tone: self.tone,
            image_url: None,
            audio_url: None,
            video_url: None,
        }
    }
}
