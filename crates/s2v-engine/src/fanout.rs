//! Bounded concurrent fan-out over a batch of work items.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::error::{EngineError, EngineResult};

/// Run `task` over every item with at most `concurrency` tasks in flight.
///
/// Results come back in input order, one per item, with each failure
/// confined to its own slot. An item that fails never prevents the others
/// from running.
pub async fn run_bounded<T, R, F, Fut>(
    concurrency: usize,
    items: Vec<T>,
    task: F,
) -> Vec<(T, EngineResult<R>)>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = EngineResult<R>>,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let task = &task;

    let futures = items.into_iter().map(|item| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let result = match semaphore.acquire().await {
                Ok(_permit) => task(item.clone()).await,
                Err(_) => Err(EngineError::config("worker semaphore closed")),
            };
            (item, result)
        }
    });

    join_all(futures).await
}

/// Count successes and failures in a fan-out result set.
pub fn tally<T, R>(outcomes: &[(T, EngineResult<R>)]) -> (usize, usize) {
    let succeeded = outcomes.iter().filter(|(_, r)| r.is_ok()).count();
    (succeeded, outcomes.len() - succeeded)
}
