//! File-backed repository for operation, story, and shot documents.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use s2v_models::{Operation, OperationStatus, Shot, Story};

use crate::error::{StateError, StateResult};
use crate::layout::StoryLayout;

/// Repository over the per-user/per-story document tree.
///
/// All writes go through [`StoryRepository::write_json`]: serialize,
/// write a temporary sibling, atomically rename over the target.
/// Concurrent writers to the same path are not coordinated beyond
/// last-write-wins; callers keep one writer per document path.
#[derive(Debug, Clone)]
pub struct StoryRepository {
    data_dir: PathBuf,
}

impl StoryRepository {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn layout(&self, user_id: &str, story_id: &str) -> StoryLayout {
        StoryLayout::new(&self.data_dir, user_id, story_id)
    }

    fn operation_path(&self, user_id: &str, operation_id: &str) -> PathBuf {
        self.data_dir
            .join(user_id)
            .join(operation_id)
            .join("json")
            .join(format!("{operation_id}.json"))
    }

    /// Atomically write a JSON document.
    pub async fn write_json<T: Serialize>(&self, path: &Path, document: &T) -> StateResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(document)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "Document written");
        Ok(())
    }

    async fn read_value(&self, path: &Path) -> StateResult<Value> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::not_found(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn update_operation(
        &self,
        user_id: &str,
        operation_id: &str,
        status: OperationStatus,
        detail: Option<&str>,
    ) -> StateResult<()> {
        let mut op = Operation::new(operation_id, status);
        op.detail = detail.map(str::to_string);
        let path = self.operation_path(user_id, operation_id);
        self.write_json(&path, &op).await?;
        info!(user = user_id, operation = operation_id, status = %status, "Operation updated");
        Ok(())
    }

    pub async fn load_operation(
        &self,
        user_id: &str,
        operation_id: &str,
    ) -> StateResult<Operation> {
        let path = self.operation_path(user_id, operation_id);
        let value = self.read_value(&path).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn upsert_story(&self, user_id: &str, story: &Story) -> StateResult<()> {
        let layout = self.layout(user_id, &story.story_id);
        self.write_json(&layout.story_path(), story).await?;
        info!(user = user_id, story = %story.story_id, "Story saved");
        Ok(())
    }

    pub async fn load_story(&self, user_id: &str, story_id: &str) -> StateResult<Story> {
        let layout = self.layout(user_id, story_id);
        let value = self.read_value(&layout.story_path()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Set the story's final video URL, preserving every other field
    /// of the stored document (including ones this version does not
    /// model).
    pub async fn update_story_video_url(
        &self,
        user_id: &str,
        story_id: &str,
        url: &str,
    ) -> StateResult<()> {
        let layout = self.layout(user_id, story_id);
        let path = layout.story_path();
        let mut doc = match self.read_value(&path).await {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(_) | Err(StateError::NotFound(_)) => Value::Object(Default::default()),
            Err(e) => return Err(e),
        };
        doc["video_url"] = Value::String(url.to_string());
        self.write_json(&path, &doc).await?;
        info!(user = user_id, story = story_id, url = url, "Story video URL updated");
        Ok(())
    }

    pub async fn save_shots(
        &self,
        user_id: &str,
        story_id: &str,
        shots: &[Shot],
    ) -> StateResult<()> {
        let layout = self.layout(user_id, story_id);
        let doc = serde_json::json!({
            "story_id": story_id,
            "shots": shots,
        });
        self.write_json(&layout.shots_path(), &doc).await?;
        info!(user = user_id, story = story_id, count = shots.len(), "Shots saved");
        Ok(())
    }

    /// Load the shots document, accepting both historical shapes: a
    /// bare list and an object wrapping the list under `"shots"`.
    /// A missing document reads as an empty list.
    pub async fn load_shots(&self, user_id: &str, story_id: &str) -> StateResult<Vec<Shot>> {
        let layout = self.layout(user_id, story_id);
        let path = layout.shots_path();
        let value = match self.read_value(&path).await {
            Ok(v) => v,
            Err(StateError::NotFound(_)) => {
                warn!(user = user_id, story = story_id, "Shots document not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let list = match value {
            Value::Array(items) => Value::Array(items),
            Value::Object(mut map) => map
                .remove("shots")
                .ok_or_else(|| {
                    StateError::invalid_document(path.display().to_string(), "missing shots field")
                })?,
            other => {
                return Err(StateError::invalid_document(
                    path.display().to_string(),
                    format!("unexpected document shape: {other}"),
                ))
            }
        };
        Ok(serde_json::from_value(list)?)
    }

    pub async fn upsert_shot(&self, user_id: &str, story_id: &str, shot: &Shot) -> StateResult<()> {
        let layout = self.layout(user_id, story_id);
        self.write_json(&layout.shot_path(&shot.id), shot).await?;
        debug!(user = user_id, story = story_id, shot = %shot.id, "Shot saved");
        Ok(())
    }

    /// Archive one raw provider response for diagnostics, keyed by
    /// trace id and poll sequence.
    pub async fn archive_response(
        &self,
        user_id: &str,
        story_id: &str,
        trace_id: &str,
        label: &str,
        poll_seq: Option<u32>,
        raw: &Value,
    ) -> StateResult<()> {
        let layout = self.layout(user_id, story_id);
        let filename = match poll_seq {
            Some(n) => format!("{label}_{trace_id}_{n}.json"),
            None => format!("{label}_{trace_id}.json"),
        };
        self.write_json(&layout.archive_dir().join(filename), raw)
            .await
    }
}
