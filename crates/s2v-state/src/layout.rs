//! On-disk layout for one story's documents and media.

use std::path::{Path, PathBuf};

/// Directory layout under `{data_dir}/{user_id}/{story_id}/`:
///
/// ```text
/// json/                    story + shots documents
/// json/shots/              per-shot documents
/// keyframes/               generated keyframe images
/// audio/                   narration audio
/// clips/                   per-shot clips and the final movie
/// archive/                 raw provider responses, keyed by trace id
/// ```
#[derive(Debug, Clone)]
pub struct StoryLayout {
    base: PathBuf,
    user_id: String,
    story_id: String,
}

impl StoryLayout {
    pub fn new(data_dir: impl AsRef<Path>, user_id: &str, story_id: &str) -> Self {
        Self {
            base: data_dir.as_ref().join(user_id).join(story_id),
            user_id: user_id.to_string(),
            story_id: story_id.to_string(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn json_dir(&self) -> PathBuf {
        self.base.join("json")
    }

    pub fn keyframes_dir(&self) -> PathBuf {
        self.base.join("keyframes")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.base.join("audio")
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.base.join("clips")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.base.join("archive")
    }

    pub fn story_path(&self) -> PathBuf {
        self.json_dir().join(format!("{}.json", self.story_id))
    }

    pub fn shots_path(&self) -> PathBuf {
        self.json_dir().join("shots.json")
    }

    pub fn shot_path(&self, shot_id: &str) -> PathBuf {
        self.json_dir().join("shots").join(format!("{shot_id}.json"))
    }

    pub fn keyframe_path(&self, sequence: u32) -> PathBuf {
        self.keyframes_dir()
            .join(format!("shot_{sequence:02}_keyframe.png"))
    }

    pub fn clip_path(&self, sequence: u32) -> PathBuf {
        self.clips_dir().join(format!("shot_{sequence:02}.mp4"))
    }

    pub fn final_video_path(&self) -> PathBuf {
        self.clips_dir().join("final.mp4")
    }

    pub fn concat_list_path(&self) -> PathBuf {
        self.clips_dir().join("concat_list.txt")
    }

    pub fn audio_path(&self, filename: &str) -> PathBuf {
        self.audio_dir().join(filename)
    }

    /// Caller-facing fallback path when an upload yields no URL.
    pub fn static_url(&self, subdir: &str, filename: &str) -> String {
        format!(
            "/static/{}/{}/{}/{}",
            self.user_id, self.story_id, subdir, filename
        )
    }

    /// Object key under the media bucket.
    pub fn object_key(&self, subdir: &str, filename: &str) -> String {
        format!(
            "users/{}/stories/{}/{}/{}",
            self.user_id, self.story_id, subdir, filename
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_scoped_to_user_and_story() {
        let layout = StoryLayout::new("/data", "u-1", "story-001");
        assert_eq!(
            layout.shots_path(),
            PathBuf::from("/data/u-1/story-001/json/shots.json")
        );
        assert_eq!(
            layout.keyframe_path(3),
            PathBuf::from("/data/u-1/story-001/keyframes/shot_03_keyframe.png")
        );
        assert_eq!(
            layout.clip_path(12),
            PathBuf::from("/data/u-1/story-001/clips/shot_12.mp4")
        );
        assert_eq!(
            layout.object_key("keyframes", "shot_03_keyframe.png"),
            "users/u-1/stories/story-001/keyframes/shot_03_keyframe.png"
        );
        assert_eq!(
            layout.static_url("clips", "final.mp4"),
            "/static/u-1/story-001/clips/final.mp4"
        );
    }
}
