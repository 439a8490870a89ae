//! Fixed-interval poller for asynchronous provider jobs.
//!
//! Generation backends accept a job and expose its status at a polling
//! endpoint. [`drive_job`] turns that into a single await point: poll at a
//! fixed interval, archive every raw status payload for diagnostics, and
//! resolve once the job reaches a terminal state or the poll budget runs
//! out.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use s2v_state::StoryRepository;

use crate::error::{EngineError, EngineResult};
use crate::providers::{JobPhase, JobPoll, ProviderError};

/// Polling cadence and budget.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Fixed delay between status checks.
    pub interval: Duration,
    /// Maximum number of status checks before giving up.
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: 600,
        }
    }
}

/// Terminal success of a polled job.
#[derive(Debug, Clone)]
pub struct PollSuccess {
    /// Where the finished artifact can be fetched from.
    pub result_url: String,
    /// How many status checks it took.
    pub polls: u32,
}

/// Sink for raw provider payloads, keyed by trace id.
///
/// Archival is diagnostics only. A failed archive write is logged and
/// swallowed so it can never fail the job it describes.
pub struct ResponseArchive {
    repo: StoryRepository,
    user_id: String,
    story_id: String,
    trace_id: String,
    label: String,
}

impl ResponseArchive {
    pub fn new(
        repo: StoryRepository,
        user_id: impl Into<String>,
        story_id: impl Into<String>,
        trace_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            user_id: user_id.into(),
            story_id: story_id.into(),
            trace_id: trace_id.into(),
            label: label.into(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Archive the submission acknowledgement.
    pub async fn record_submit(&self, raw: &Value) {
        self.record(&format!("{}_submit", self.label), None, raw).await;
    }

    /// Archive one poll response, keyed by poll sequence number.
    pub async fn record_poll(&self, poll_seq: u32, raw: &Value) {
        self.record(&self.label, Some(poll_seq), raw).await;
    }

    async fn record(&self, label: &str, poll_seq: Option<u32>, raw: &Value) {
        if let Err(e) = self
            .repo
            .archive_response(&self.user_id, &self.story_id, &self.trace_id, label, poll_seq, raw)
            .await
        {
            warn!(
                trace = %self.trace_id,
                label = label,
                error = %e,
                "Failed to archive provider response"
            );
        }
    }
}

/// Poll a submitted job to completion.
///
/// Semantics per status check:
/// - in progress, or a retryable poll error: wait one interval and poll
///   again;
/// - terminal failure, or a non-retryable poll error: resolve with
///   [`EngineError::JobFailed`] / the provider error;
/// - terminal success with a result location: resolve with it;
/// - terminal success without a result location: keep polling, some
///   backends report success one cycle before the artifact URL appears.
///
/// Exceeding `policy.max_polls` resolves with [`EngineError::Timeout`].
pub async fn drive_job<F, Fut>(
    policy: &PollPolicy,
    archive: &ResponseArchive,
    mut poll: F,
) -> EngineResult<PollSuccess>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobPoll, ProviderError>>,
{
    let mut polls = 0u32;

    while polls < policy.max_polls {
        polls += 1;
        match poll().await {
            Ok(status) => {
                archive.record_poll(polls, &status.raw).await;
                match status.phase {
                    JobPhase::Succeeded => match status.result_url {
                        Some(result_url) => {
                            debug!(trace = %archive.trace_id(), polls, "Job succeeded");
                            return Ok(PollSuccess { result_url, polls });
                        }
                        None => {
                            debug!(
                                trace = %archive.trace_id(),
                                polls,
                                "Job reports success without a result location, continuing"
                            );
                        }
                    },
                    JobPhase::Failed => {
                        let detail = status
                            .message
                            .unwrap_or_else(|| "provider reported failure".to_string());
                        return Err(EngineError::job_failed(detail));
                    }
                    JobPhase::InProgress => {}
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(trace = %archive.trace_id(), polls, error = %e, "Status check failed");
            }
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(policy.interval).await;
    }

    Err(EngineError::Timeout { polls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    fn archive_in(dir: &std::path::Path) -> ResponseArchive {
        ResponseArchive::new(StoryRepository::new(dir), "u1", "s1", "trace-1", "video")
    }

    fn in_progress() -> JobPoll {
        JobPoll {
            phase: JobPhase::InProgress,
            result_url: None,
            message: None,
            raw: json!({"status": "RUNNING"}),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_terminal_success() {
        let dir = tempdir().unwrap();
        let archive = archive_in(dir.path());
        let policy = PollPolicy::default();
        let calls = AtomicU32::new(0);

        let success = drive_job(&policy, &archive, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Ok(in_progress())
                } else {
                    Ok(JobPoll {
                        phase: JobPhase::Succeeded,
                        result_url: Some("https://cdn/out.mp4".into()),
                        message: None,
                        raw: json!({"status": "SUCCEEDED"}),
                    })
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(success.result_url, "https://cdn/out.mp4");
        assert_eq!(success.polls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_result_url_keeps_polling() {
        let dir = tempdir().unwrap();
        let archive = archive_in(dir.path());
        let policy = PollPolicy::default();
        let calls = AtomicU32::new(0);

        let success = drive_job(&policy, &archive, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(JobPoll {
                        phase: JobPhase::Succeeded,
                        result_url: None,
                        message: None,
                        raw: json!({"status": "SUCCEEDED"}),
                    })
                } else {
                    Ok(JobPoll {
                        phase: JobPhase::Succeeded,
                        result_url: Some("https://cdn/out.mp4".into()),
                        message: None,
                        raw: json!({"status": "SUCCEEDED", "video_url": "https://cdn/out.mp4"}),
                    })
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(success.polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn never_progressing_job_times_out() {
        let dir = tempdir().unwrap();
        let archive = archive_in(dir.path());
        let policy = PollPolicy::default();
        let calls = AtomicU32::new(0);

        let err = drive_job(&policy, &archive, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(in_progress()) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 600);
        match err {
            EngineError::Timeout { polls } => assert_eq!(polls, 600),
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_resolves_with_detail() {
        let dir = tempdir().unwrap();
        let archive = archive_in(dir.path());
        let policy = PollPolicy::default();

        let err = drive_job(&policy, &archive, || async {
            Ok(JobPoll {
                phase: JobPhase::Failed,
                result_url: None,
                message: Some("input image rejected".into()),
                raw: json!({"status": "FAILED"}),
            })
        })
        .await
        .unwrap_err();

        match err {
            EngineError::JobFailed(msg) => assert!(msg.contains("input image rejected")),
            other => panic!("expected job failure, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_are_tolerated() {
        let dir = tempdir().unwrap();
        let archive = archive_in(dir.path());
        let policy = PollPolicy::default();
        let calls = AtomicU32::new(0);

        let success = drive_job(&policy, &archive, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::transient("connection reset"))
                } else {
                    Ok(JobPoll {
                        phase: JobPhase::Succeeded,
                        result_url: Some("https://cdn/out.mp4".into()),
                        message: None,
                        raw: json!({"status": "SUCCEEDED"}),
                    })
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(success.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_poll_error_resolves_failed() {
        let dir = tempdir().unwrap();
        let archive = archive_in(dir.path());
        let policy = PollPolicy::default();

        let err = drive_job(&policy, &archive, || async {
            Err(ProviderError::fatal("credentials revoked"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::Provider(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn archive_failure_never_fails_the_job() {
        let dir = tempdir().unwrap();
        // Occupy the user directory with a file so archive writes cannot
        // create their parent directories.
        std::fs::write(dir.path().join("u1"), b"in the way").unwrap();
        let archive = archive_in(dir.path());
        let policy = PollPolicy::default();

        let success = drive_job(&policy, &archive, || async {
            Ok(JobPoll {
                phase: JobPhase::Succeeded,
                result_url: Some("https://cdn/out.mp4".into()),
                message: None,
                raw: json!({"status": "SUCCEEDED"}),
            })
        })
        .await
        .unwrap();

        assert_eq!(success.polls, 1);
    }

    #[tokio::test]
    async fn poll_responses_are_archived_in_sequence() {
        let dir = tempdir().unwrap();
        let archive = archive_in(dir.path());
        let policy = PollPolicy {
            interval: Duration::from_millis(1),
            max_polls: 10,
        };
        let calls = AtomicU32::new(0);

        drive_job(&policy, &archive, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(in_progress())
                } else {
                    Ok(JobPoll {
                        phase: JobPhase::Succeeded,
                        result_url: Some("https://cdn/out.mp4".into()),
                        message: None,
                        raw: json!({"n": n}),
                    })
                }
            }
        })
        .await
        .unwrap();

        let archive_dir = dir.path().join("u1").join("s1").join("archive");
        assert!(archive_dir.join("video_trace-1_1.json").exists());
        assert!(archive_dir.join("video_trace-1_2.json").exists());
    }
}
