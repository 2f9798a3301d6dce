//! Names and schedules of the background jobs.

use bridge_traits::background::{JobLimits, JobSpec};
use core_runtime::SyncConfig;
use std::time::Duration;

/// Discover applications and builds, enqueue fetch tasks
pub const SYNC_JOB_NAME: &str = "sync_dsyms_from_itunes_connect";

/// Drain the build task queue
pub const FETCH_JOB_NAME: &str = "fetch_dsym_url";

/// How long a drain keeps claiming new tasks
pub const FETCH_DRAIN_SOFT_LIMIT: Duration = Duration::from_secs(60);

pub fn sync_job_spec(config: &SyncConfig) -> JobSpec {
    JobSpec::new(
        SYNC_JOB_NAME,
        config.sync_interval,
        JobLimits::new(config.sync_soft_limit, config.sync_hard_limit),
    )
}

/// The drain stops claiming at the soft limit; the hard limit leaves room
/// for the last claimed task to run to its own time limit.
pub fn fetch_job_spec(config: &SyncConfig) -> JobSpec {
    JobSpec::new(
        FETCH_JOB_NAME,
        config.fetch_interval,
        JobLimits::new(
            FETCH_DRAIN_SOFT_LIMIT,
            FETCH_DRAIN_SOFT_LIMIT + config.fetch_task_time_limit,
        ),
    )
}
