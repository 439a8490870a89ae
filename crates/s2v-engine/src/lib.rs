//! Render pipeline orchestration.
//!
//! Turns a short script into a finished video through four sequenced
//! stages (storyboard, keyframes, narration, clips) plus final assembly,
//! with bounded fan-out inside each stage and crash-consistent progress
//! documents on disk.

pub mod config;
pub mod error;
pub mod fanout;
pub mod merge;
pub mod poller;
pub mod pool;
pub mod providers;
pub mod retry;
pub mod sequencer;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use poller::{drive_job, PollPolicy, PollSuccess, ResponseArchive};
pub use pool::{HostLease, HostPool};
pub use retry::{retry_async, RetryOutcome, RetryPolicy};
pub use sequencer::{create_storyboard, regenerate_shot, render_video, EngineContext};
