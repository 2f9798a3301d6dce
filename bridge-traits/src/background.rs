//! Background Job Scheduling
//!
//! Named recurring jobs with soft and hard time limits.

use std::time::{Duration, Instant};

use crate::error::Result;

/// Time limits applied to a single run of a job.
///
/// The soft limit is cooperative: the job checks its [`RunBudget`] and stops
/// starting new work once it has passed. The hard limit is enforced by the
/// scheduler, which abandons the run when it is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLimits {
    pub soft_limit: Duration,
    pub hard_limit: Duration,
}

impl JobLimits {
    pub fn new(soft_limit: Duration, hard_limit: Duration) -> Self {
        Self {
            soft_limit,
            hard_limit,
        }
    }

    /// True when the soft limit fires strictly before the hard limit.
    pub fn is_valid(&self) -> bool {
        self.soft_limit < self.hard_limit
    }
}

/// Description of a recurring job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Stable job name; handlers are registered under this name
    pub name: String,
    /// How often to run the job
    pub interval: Duration,
    pub limits: JobLimits,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, interval: Duration, limits: JobLimits) -> Self {
        Self {
            name: name.into(),
            interval,
            limits,
        }
    }
}

/// Clock for one job run, handed to the handler.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    started: Instant,
    limits: JobLimits,
}

impl RunBudget {
    /// Start a budget now.
    pub fn start(limits: JobLimits) -> Self {
        Self {
            started: Instant::now(),
            limits,
        }
    }

    /// A budget that never reaches its soft limit in practice.
    pub fn unbounded() -> Self {
        let forever = Duration::from_secs(u32::MAX as u64);
        Self::start(JobLimits::new(forever, forever))
    }

    pub fn limits(&self) -> JobLimits {
        self.limits
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the cooperative deadline has passed.
    pub fn soft_limit_reached(&self) -> bool {
        self.elapsed() >= self.limits.soft_limit
    }

    /// Time left before the soft limit.
    pub fn remaining_soft(&self) -> Duration {
        self.limits.soft_limit.saturating_sub(self.elapsed())
    }
}

/// Scheduled job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Job is scheduled but not currently running
    Scheduled,
    /// Job is currently executing
    Running,
    /// Last run completed successfully
    Completed,
    /// Last run returned an error
    Failed,
    /// Last run exceeded its hard limit
    TimedOut,
    /// Job was cancelled
    Cancelled,
}

/// Background job scheduler trait
///
/// Handlers are registered by name on the concrete scheduler; this trait
/// covers scheduling and inspection.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{JobLimits, JobScheduler, JobSpec};
/// use std::time::Duration;
///
/// async fn schedule_sync(scheduler: &dyn JobScheduler) -> Result<()> {
///     let limits = JobLimits::new(Duration::from_secs(60), Duration::from_secs(90));
///     scheduler
///         .schedule_recurring(JobSpec::new("sync", Duration::from_secs(3600), limits))
///         .await?;
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait JobScheduler: Send + Sync {
    /// Schedule a recurring job.
    ///
    /// Fails if no handler is registered under `spec.name` or the limits are
    /// inconsistent.
    async fn schedule_recurring(&self, spec: JobSpec) -> Result<JobId>;

    /// Run a registered job once, immediately, and wait for the outcome.
    async fn run_now(&self, name: &str, limits: JobLimits) -> Result<JobStatus>;

    /// Cancel a scheduled job
    async fn cancel(&self, job_id: &JobId) -> Result<()>;

    /// Get status of a job
    async fn status(&self, job_id: &JobId) -> Result<JobStatus>;

    /// List all scheduled jobs
    async fn list_jobs(&self) -> Result<Vec<JobId>>;
}
