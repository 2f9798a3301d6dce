//! # Build Task Worker
//!
//! Drains the [`TaskQueue`] with bounded concurrency.
//!
//! Each claimed task runs under its own hard time limit. Outcomes are written
//! back to the queue: success completes the task, a retryable error sends it
//! back to `pending` with backoff, anything else fails it for good. A failing
//! task never affects the other tasks of the same drain.

use crate::error::{Result, SyncError};
use crate::fetch_task::{BuildFetcher, FetchOutcome};
use crate::task_queue::{BuildTask, BuildTaskStatus, TaskQueue};
use bridge_traits::background::RunBudget;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Default hard limit of a single build task
pub const DEFAULT_TASK_TIME_LIMIT: Duration = Duration::from_secs(300);

/// Counters for one drain of the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub claimed: u64,
    pub registered: u64,
    pub already_synced: u64,
    pub concurrently_registered: u64,
    /// Failed attempts that will be retried
    pub retrying: u64,
    /// Tasks that failed permanently
    pub failed: u64,
    /// The soft limit stopped the drain before the queue was empty
    pub interrupted: bool,
}

impl DrainReport {
    fn record(&mut self, result: TaskResult) {
        match result {
            TaskResult::Done(FetchOutcome::Registered { .. }) => self.registered += 1,
            TaskResult::Done(FetchOutcome::AlreadySynced) => self.already_synced += 1,
            TaskResult::Done(FetchOutcome::ConcurrentlyRegistered) => {
                self.concurrently_registered += 1
            }
            TaskResult::Failed(BuildTaskStatus::Pending) => self.retrying += 1,
            TaskResult::Failed(_) => self.failed += 1,
        }
    }
}

enum TaskResult {
    Done(FetchOutcome),
    /// Status the task was left in after the failed attempt
    Failed(BuildTaskStatus),
}

pub struct BuildTaskWorker {
    queue: Arc<TaskQueue>,
    fetcher: Arc<BuildFetcher>,
    concurrency: usize,
    task_time_limit: Duration,
}

impl BuildTaskWorker {
    pub fn new(queue: Arc<TaskQueue>, fetcher: Arc<BuildFetcher>, concurrency: usize) -> Self {
        Self {
            queue,
            fetcher,
            concurrency: concurrency.max(1),
            task_time_limit: DEFAULT_TASK_TIME_LIMIT,
        }
    }

    pub fn with_task_time_limit(mut self, limit: Duration) -> Self {
        self.task_time_limit = limit;
        self
    }

    /// Requeue tasks a previous process left in `processing`.
    ///
    /// Call once at startup, before the first drain.
    pub async fn recover(&self) -> Result<u64> {
        self.queue.requeue_stale().await
    }

    /// Process available tasks until the queue is empty or the soft limit
    /// of `budget` is reached. In-flight tasks are always awaited.
    ///
    /// Tasks left `processing` for longer than the task time limit are
    /// requeued first.
    #[instrument(skip(self, budget), fields(concurrency = self.concurrency))]
    pub async fn drain(&self, budget: &RunBudget) -> Result<DrainReport> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight: JoinSet<Result<TaskResult>> = JoinSet::new();
        let mut report = DrainReport::default();
        let mut claim_error = None;

        self.queue.requeue_expired(self.task_time_limit).await?;

        loop {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SyncError::Cancelled)?;

            // Waiting for a permit can outlast the soft limit.
            if budget.soft_limit_reached() {
                drop(permit);
                report.interrupted = true;
                info!(claimed = report.claimed, "Soft limit reached, no new build tasks");
                break;
            }

            match self.queue.dequeue().await {
                Ok(Some(task)) => {
                    report.claimed += 1;
                    let queue = self.queue.clone();
                    let fetcher = self.fetcher.clone();
                    let limit = self.task_time_limit;
                    in_flight.spawn(async move {
                        let result = process_task(&queue, &fetcher, task, limit).await;
                        drop(permit);
                        result
                    });
                }
                Ok(None) => {
                    drop(permit);
                    // Tasks still running may requeue themselves; wait for one.
                    match in_flight.join_next().await {
                        Some(joined) => record_joined(&mut report, joined),
                        None => break,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to claim build task");
                    claim_error = Some(e);
                    break;
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            record_joined(&mut report, joined);
        }

        if let Some(e) = claim_error {
            return Err(e);
        }

        info!(
            claimed = report.claimed,
            registered = report.registered,
            already_synced = report.already_synced,
            retrying = report.retrying,
            failed = report.failed,
            interrupted = report.interrupted,
            "Build task drain finished"
        );
        Ok(report)
    }
}

fn record_joined(
    report: &mut DrainReport,
    joined: std::result::Result<Result<TaskResult>, tokio::task::JoinError>,
) {
    match joined {
        Ok(Ok(result)) => report.record(result),
        Ok(Err(e)) => {
            // The attempt's outcome could not be written back; the task stays
            // `processing` until the next recovery.
            error!(error = %e, "Failed to record build task outcome");
            report.failed += 1;
        }
        Err(e) => {
            error!(error = %e, "Build task panicked or was aborted");
            report.failed += 1;
        }
    }
}

#[instrument(skip_all, fields(task_id = %task.id, dedup_key = %task.dedup_key, attempt = task.retry_count + 1))]
async fn process_task(
    queue: &TaskQueue,
    fetcher: &BuildFetcher,
    task: BuildTask,
    limit: Duration,
) -> Result<TaskResult> {
    let outcome = match tokio::time::timeout(limit, fetcher.fetch_build(&task.request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(SyncError::Timeout(limit.as_secs())),
    };

    match outcome {
        Ok(outcome) => {
            queue.mark_complete(task.id).await?;
            debug!(?outcome, "Build task succeeded");
            Ok(TaskResult::Done(outcome))
        }
        Err(e) => {
            let status = queue.mark_failed(task.id, &e).await?;
            Ok(TaskResult::Failed(status))
        }
    }
}
