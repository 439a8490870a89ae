//! Story metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Persisted story document. `script_content` is immutable after
/// creation; `video_url` is written once rendering completes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Story {
    pub story_id: String,
    pub display_name: String,
    pub style: String,
    pub script_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl Story {
    pub fn new(
        story_id: impl Into<String>,
        display_name: impl Into<String>,
        style: impl Into<String>,
        script_content: impl Into<String>,
    ) -> Self {
        Self {
            story_id: story_id.into(),
            display_name: display_name.into(),
            style: style.into(),
            script_content: script_content.into(),
            video_url: None,
        }
    }

    /// Script text prefixed with the style tag, the form the
    /// storyboard provider expects.
    pub fn styled_script(&self) -> String {
        format!("style:{}:{}", self.style, self.script_content)
    }
}
