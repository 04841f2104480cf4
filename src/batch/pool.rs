// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bounded pool of push workers.

use std::{future::Future, sync::Arc};
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tracing::trace;

/// Smallest number of concurrent workers.
pub const MIN_WORKERS: usize = 1;

/// Largest number of concurrent workers.
pub const MAX_WORKERS: usize = 8;

/// Number of concurrent workers used when none is configured.
pub const DEFAULT_WORKERS: usize = 4;

/// Clamp requested worker count into the supported range.
pub fn clamp_workers(workers: usize) -> usize {
    workers.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Pool running at most a fixed number of jobs at once.
///
/// Submitting never waits: every job is spawned right away and then waits
/// for a permit inside its own task. The caller can keep producing work
/// while earlier jobs are still running.
#[derive(Debug)]
pub struct WorkerPool<T> {
    permits: Arc<Semaphore>,
    tasks: JoinSet<T>,
    workers: usize,
}

impl<T> WorkerPool<T>
where
    T: Send + 'static,
{
    /// Construct new pool with `workers` clamped into range.
    pub fn new(workers: usize) -> Self {
        let workers = clamp_workers(workers);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            tasks: JoinSet::new(),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of submitted jobs not joined yet.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Submit job to the pool.
    pub fn submit<F>(&mut self, job: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            // INVARIANT: Semaphore is never closed, so acquiring cannot fail.
            let _permit = permits.acquire_owned().await.ok();
            trace!("worker permit acquired");
            job.await
        });
    }

    /// Wait for every submitted job.
    ///
    /// Results come back in completion order. A job that panicked shows up
    /// as a [`JoinError`].
    pub async fn join(mut self) -> Vec<Result<T, JoinError>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next().await {
            results.push(result);
        }

        results
    }
}
