//! Retry controller with exponential backoff.
//!
//! Wraps calls to flaky external services (generation APIs, object storage)
//! and reruns them with capped exponential delays. Errors that report
//! themselves as non-retryable short-circuit the remaining budget.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::providers::ProviderError;

/// Classifies an error as worth retrying or not.
pub trait RetryClass {
    fn is_retryable(&self) -> bool;
}

impl RetryClass for EngineError {
    fn is_retryable(&self) -> bool {
        EngineError::is_retryable(self)
    }
}

impl RetryClass for ProviderError {
    fn is_retryable(&self) -> bool {
        ProviderError::is_retryable(self)
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt (doubles each attempt).
    pub base_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Set the total number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the base delay for exponential backoff.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.pow(exp));
        delay.min(self.max_delay)
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed and the budget is spent (or the error was fatal).
    Exhausted { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }

    /// Collapse into a plain `Result`, discarding the attempt count.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Success(v) => Ok(v),
            RetryOutcome::Exhausted { error, .. } => Err(error),
        }
    }
}

/// Execute an async operation under a retry policy.
///
/// The operation is attempted up to `policy.max_attempts` times. A failure
/// classified as non-retryable ends the loop immediately.
///
/// # Example
/// ```ignore
/// let policy = RetryPolicy::new("clip_generation").with_max_attempts(5);
/// let outcome = retry_async(&policy, || async {
///     client.submit(&spec).await
/// }).await;
/// ```
pub async fn retry_async<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> RetryOutcome<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClass + std::fmt::Display,
{
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(e) if !e.is_retryable() => {
                debug!(
                    "{} attempt {} failed with non-retryable error: {}",
                    policy.operation_name, attempt, e
                );
                return RetryOutcome::Exhausted { error: e, attempts: attempt };
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    policy.operation_name, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(
                    "{} failed after {} attempts: {}",
                    policy.operation_name, attempt, e
                );
                return RetryOutcome::Exhausted { error: e, attempts: attempt };
            }
        }
    }
}
