//! Engine configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::poller::PollPolicy;
use crate::retry::RetryPolicy;

/// Tunables for the render pipeline.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the per-user/per-story document tree.
    pub data_dir: PathBuf,
    /// Concurrent keyframe generations per storyboard.
    pub keyframe_concurrency: usize,
    /// Concurrent narration syntheses per render.
    pub tts_concurrency: usize,
    /// Retry budget for the storyboard model.
    pub storyboard_retry: RetryPolicy,
    /// Retry budget for one keyframe generation.
    pub keyframe_retry: RetryPolicy,
    /// Retry budget for one narration synthesis.
    pub tts_retry: RetryPolicy,
    /// Retry budget for one full clip generation unit.
    pub clip_retry: RetryPolicy,
    /// Retry budget for recovering a missing keyframe from its URL.
    pub keyframe_recovery_retry: RetryPolicy,
    /// Polling cadence and budget for video jobs.
    pub poll: PollPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            keyframe_concurrency: 2,
            tts_concurrency: 2,
            storyboard_retry: RetryPolicy::new("storyboard_generation").with_max_attempts(3),
            keyframe_retry: RetryPolicy::new("keyframe_generation").with_max_attempts(3),
            tts_retry: RetryPolicy::new("narration_synthesis").with_max_attempts(3),
            clip_retry: RetryPolicy::new("clip_generation").with_max_attempts(5),
            keyframe_recovery_retry: RetryPolicy::new("keyframe_recovery").with_max_attempts(3),
            poll: PollPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> EngineResult<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("S2V_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(n) = parse_var("S2V_KEYFRAME_CONCURRENCY")? {
            config.keyframe_concurrency = n;
        }
        if let Some(n) = parse_var("S2V_TTS_CONCURRENCY")? {
            config.tts_concurrency = n;
        }
        if let Some(n) = parse_var::<u32>("S2V_CLIP_RETRY_ATTEMPTS")? {
            config.clip_retry = config.clip_retry.with_max_attempts(n);
        }
        if let Some(n) = parse_var::<u64>("S2V_POLL_INTERVAL_SECS")? {
            config.poll.interval = Duration::from_secs(n);
        }
        if let Some(n) = parse_var::<u32>("S2V_MAX_POLLS")? {
            config.poll.max_polls = n;
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> EngineResult<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| EngineError::config(format!("{name} has an invalid value: {value}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.keyframe_concurrency, 2);
        assert_eq!(config.tts_concurrency, 2);
        assert_eq!(config.clip_retry.max_attempts, 5);
        assert_eq!(config.poll.interval, Duration::from_secs(2));
        assert_eq!(config.poll.max_polls, 600);
    }
}
