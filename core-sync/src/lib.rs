//! # Debug Symbol Sync
//!
//! Keeps a project's debug symbols in step with its app catalog.
//!
//! ## Overview
//!
//! A scheduled run discovers every application and build in each enabled
//! project's catalog and enqueues one fetch task per build. Workers drain
//! the queue: each task downloads the build's dSYM archive, unpacks the
//! Mach-O files into project storage and registers them as a bundle.
//! Everything is idempotent; a build is registered at most once no matter
//! how often it is discovered or how many workers race for it.
//!
//! ## Components
//!
//! - **Orchestrator** (`orchestrator`): discover applications and builds, dispatch tasks
//! - **Task Queue** (`task_queue`): persisted, deduplicated queue with retry and backoff
//! - **Worker** (`worker`): bounded-concurrency drain of the queue
//! - **Fetch Task** (`fetch_task`): the per-build unit of work
//! - **Pipeline** (`pipeline`): download, spool, unpack, register
//! - **Unpacker** (`unpacker`): archive to stored symbol files
//! - **Catalog** (`catalog`): per-project catalog client resolution
//! - **Jobs** (`jobs`): job names and schedules

pub mod catalog;
pub mod error;
pub mod fetch_task;
pub mod jobs;
pub mod orchestrator;
pub mod pipeline;
pub mod task_queue;
pub mod unpacker;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use catalog::CatalogClientResolver;
pub use error::{Result, SyncError};
pub use fetch_task::{AppRef, BuildFetcher, FetchBuildRequest, FetchOutcome};
pub use jobs::{fetch_job_spec, sync_job_spec, FETCH_JOB_NAME, SYNC_JOB_NAME};
pub use orchestrator::{SyncOrchestrator, SyncRunReport};
pub use pipeline::SymbolPipeline;
pub use task_queue::{
    BuildTask, BuildTaskId, BuildTaskRepository, BuildTaskStatus, EnqueueOutcome, QueueStats,
    SqliteBuildTaskRepository, TaskQueue,
};
pub use unpacker::{ArchiveUnpacker, DebugArchiveUnpacker};
pub use worker::{BuildTaskWorker, DrainReport};
