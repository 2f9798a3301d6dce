//! Tokio-based Job Scheduler

use async_trait::async_trait;
use bridge_traits::{
    background::{JobId, JobLimits, JobScheduler, JobSpec, JobStatus, RunBudget},
    error::{BridgeError, Result},
    time::{Clock, SystemClock},
};
use futures_util::{future::BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

type JobHandler = Arc<dyn Fn(RunBudget) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs named jobs on the Tokio runtime.
///
/// Each run receives a [`RunBudget`] for the job's soft limit and is wrapped in
/// `tokio::time::timeout` for its hard limit. A recurring job never overlaps
/// itself: a tick that arrives while a run is in progress is skipped.
pub struct TokioJobScheduler {
    jobs: Arc<RwLock<HashMap<JobId, JobInfo>>>,
    handlers: Arc<RwLock<HashMap<String, JobHandler>>>,
    clock: Arc<dyn Clock>,
}

struct JobInfo {
    status: JobStatus,
    handle: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
    last_run: Option<i64>,
    next_run: Option<i64>,
    runs: u64,
}

impl TokioJobScheduler {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn duration_to_millis(duration: Duration) -> i64 {
        duration.as_millis().min(i64::MAX as u128) as i64
    }

    /// Register the handler invoked for every run of `name`.
    pub async fn register_job<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(RunBudget) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(
            name.to_string(),
            Arc::new(move |budget| handler(budget).boxed()),
        );
    }

    async fn handler_for(&self, name: &str) -> Result<JobHandler> {
        let handlers = self.handlers.read().await;
        handlers.get(name).cloned().ok_or_else(|| {
            BridgeError::OperationFailed(format!("No handler registered for job: {}", name))
        })
    }

    fn check_limits(name: &str, limits: &JobLimits) -> Result<()> {
        if limits.is_valid() {
            Ok(())
        } else {
            Err(BridgeError::OperationFailed(format!(
                "Job {} has soft limit {:?} not below hard limit {:?}",
                name, limits.soft_limit, limits.hard_limit
            )))
        }
    }

    /// Number of completed runs (any outcome) for a job.
    pub async fn run_count(&self, job_id: &JobId) -> Result<u64> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .map(|info| info.runs)
            .ok_or_else(|| BridgeError::OperationFailed(format!("Job not found: {}", job_id)))
    }

    /// Execute one run under the given limits.
    async fn run_once(name: &str, handler: &JobHandler, limits: JobLimits) -> JobStatus {
        let budget = RunBudget::start(limits);

        match tokio::time::timeout(limits.hard_limit, handler(budget)).await {
            Ok(Ok(())) => {
                debug!(
                    job = name,
                    elapsed_ms = budget.elapsed().as_millis() as u64,
                    "Job run completed"
                );
                JobStatus::Completed
            }
            Ok(Err(err)) => {
                warn!(job = name, error = %err, "Job run failed");
                JobStatus::Failed
            }
            Err(_) => {
                warn!(
                    job = name,
                    hard_limit_ms = limits.hard_limit.as_millis() as u64,
                    "Job run exceeded hard limit; abandoned"
                );
                JobStatus::TimedOut
            }
        }
    }

    async fn run_recurring(
        jobs: Arc<RwLock<HashMap<JobId, JobInfo>>>,
        id: JobId,
        handler: JobHandler,
        spec: JobSpec,
        mut cancel_rx: oneshot::Receiver<()>,
        clock: Arc<dyn Clock>,
    ) {
        let mut ticker = tokio::time::interval(spec.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let period_millis = Self::duration_to_millis(spec.interval);

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    let mut jobs = jobs.write().await;
                    if let Some(info) = jobs.get_mut(&id) {
                        info.status = JobStatus::Cancelled;
                        info.next_run = None;
                    }
                    break;
                }
                _ = ticker.tick() => {
                    {
                        let mut jobs = jobs.write().await;
                        if let Some(info) = jobs.get_mut(&id) {
                            info.status = JobStatus::Running;
                        }
                    }

                    let status = Self::run_once(&spec.name, &handler, spec.limits).await;

                    let mut jobs = jobs.write().await;
                    if let Some(info) = jobs.get_mut(&id) {
                        let now = clock.unix_timestamp_millis();
                        info.last_run = Some(now);
                        info.next_run = Some(now.saturating_add(period_millis));
                        info.runs += 1;
                        info.status = status;
                    }
                }
            }
        }
    }
}

impl Default for TokioJobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobScheduler for TokioJobScheduler {
    async fn schedule_recurring(&self, spec: JobSpec) -> Result<JobId> {
        Self::check_limits(&spec.name, &spec.limits)?;
        let handler = self.handler_for(&spec.name).await?;
        let id = JobId::new(spec.name.clone());

        if self.jobs.read().await.contains_key(&id) {
            return Err(BridgeError::OperationFailed(format!(
                "Job already scheduled: {}",
                id
            )));
        }

        info!(
            job = %spec.name,
            interval_secs = spec.interval.as_secs(),
            soft_limit_secs = spec.limits.soft_limit.as_secs(),
            hard_limit_secs = spec.limits.hard_limit.as_secs(),
            "Scheduling recurring job"
        );

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let mut jobs = self.jobs.write().await;
        jobs.insert(
            id.clone(),
            JobInfo {
                status: JobStatus::Scheduled,
                handle: None,
                cancel: Some(cancel_tx),
                last_run: None,
                next_run: Some(self.clock.unix_timestamp_millis()),
                runs: 0,
            },
        );

        let handle = tokio::spawn(Self::run_recurring(
            Arc::clone(&self.jobs),
            id.clone(),
            handler,
            spec,
            cancel_rx,
            Arc::clone(&self.clock),
        ));

        if let Some(info) = jobs.get_mut(&id) {
            info.handle = Some(handle);
        }

        Ok(id)
    }

    async fn run_now(&self, name: &str, limits: JobLimits) -> Result<JobStatus> {
        Self::check_limits(name, &limits)?;
        let handler = self.handler_for(name).await?;
        debug!(job = name, "Running job immediately");
        Ok(Self::run_once(name, &handler, limits).await)
    }

    async fn cancel(&self, job_id: &JobId) -> Result<()> {
        debug!(job = %job_id, "Cancelling job");

        let mut jobs = self.jobs.write().await;
        if let Some(mut info) = jobs.remove(job_id) {
            if let Some(cancel) = info.cancel.take() {
                let _ = cancel.send(());
            }
            if let Some(handle) = info.handle.take() {
                handle.abort();
            }
            return Ok(());
        }

        Err(BridgeError::OperationFailed(format!(
            "Job not found: {}",
            job_id
        )))
    }

    async fn status(&self, job_id: &JobId) -> Result<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .map(|info| info.status)
            .ok_or_else(|| BridgeError::OperationFailed(format!("Job not found: {}", job_id)))
    }

    async fn list_jobs(&self) -> Result<Vec<JobId>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.keys().cloned().collect())
    }
}
