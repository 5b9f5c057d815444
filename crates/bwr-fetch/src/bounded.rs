//! Fixed-width pool of asynchronous fetch tasks
//!
//! Every task waits on a shared semaphore before it starts, so at most
//! `width` downloads or requests are in flight. Results come back in
//! completion order; a failed task never cancels the others.

use crate::error::{FetchError, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::ProgressBar;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default number of concurrent tasks
pub const DEFAULT_WIDTH: usize = 5;

/// Run `f` over every item with at most `width` tasks in flight.
///
/// When a progress bar is given it advances by one per finished task.
pub async fn run_bounded<T, R, F, Fut>(
    items: impl IntoIterator<Item = T>,
    width: usize,
    progress: Option<&ProgressBar>,
    f: F,
) -> Vec<Result<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let semaphore = Arc::new(Semaphore::new(width.max(1)));
    let mut tasks = FuturesUnordered::new();
    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let task = f(item);
        tasks.push(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| FetchError::invalid_input("task pool closed"))?;
            task.await
        });
    }

    debug!(tasks = tasks.len(), width, "Running bounded task pool");
    let mut results = Vec::with_capacity(tasks.len());
    while let Some(result) = tasks.next().await {
        if let Err(e) = &result {
            warn!(error = %e, "Task failed");
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
        results.push(result);
    }
    results
}

/// Outcome counts of a bounded run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl FetchSummary {
    pub fn from_results<R>(results: &[Result<R>]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    pub fn merge(self, other: FetchSummary) -> Self {
        Self {
            total: self.total + other.total,
            succeeded: self.succeeded + other.succeeded,
            failed: self.failed + other.failed,
        }
    }
}
