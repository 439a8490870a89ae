//! Final movie assembly via ffmpeg's concat demuxer.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::providers::ClipMerger;

/// Concatenates clips with `ffmpeg -f concat -c copy`. Clips share one
/// encoding profile, so streams are copied rather than re-encoded.
pub struct FfmpegMerger {
    ffmpeg_bin: String,
}

impl FfmpegMerger {
    pub fn new() -> Self {
        Self {
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the concat demuxer list file. Paths are absolute, one
/// `file` directive per clip.
fn concat_list(clips: &[PathBuf]) -> String {
    let mut list = String::new();
    for clip in clips {
        list.push_str(&format!("file '{}'\n", clip.display()));
    }
    list
}

#[async_trait::async_trait]
impl ClipMerger for FfmpegMerger {
    async fn concat(
        &self,
        clips: &[PathBuf],
        list_file: &Path,
        output: &Path,
    ) -> EngineResult<()> {
        if clips.is_empty() {
            return Err(EngineError::merge("no clips to concatenate"));
        }

        if let Some(parent) = list_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(list_file, concat_list(clips)).await?;
        debug!(clips = clips.len(), list = %list_file.display(), "Concat list written");

        let result = Command::new(&self.ffmpeg_bin)
            .args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(list_file)
            .args(["-c", "copy"])
            .arg(output)
            .output()
            .await
            .map_err(|e| EngineError::merge(format!("spawn {}: {e}", self.ffmpeg_bin)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(EngineError::merge(format!(
                "ffmpeg exited with {}: {tail}",
                result.status
            )));
        }

        info!(output = %output.display(), clips = clips.len(), "Final video assembled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_list_has_one_directive_per_clip() {
        let clips = vec![
            PathBuf::from("/data/u/s/clips/shot_01.mp4"),
            PathBuf::from("/data/u/s/clips/shot_02.mp4"),
        ];
        let list = concat_list(&clips);
        assert_eq!(
            list,
            "file '/data/u/s/clips/shot_01.mp4'\nfile '/data/u/s/clips/shot_02.mp4'\n"
        );
    }

    #[tokio::test]
    async fn empty_clip_list_is_rejected() {
        let merger = FfmpegMerger::new();
        let err = merger
            .concat(&[], Path::new("/tmp/list.txt"), Path::new("/tmp/out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Merge(_)));
    }
}
