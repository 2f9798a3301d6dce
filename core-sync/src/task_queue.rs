//! # Build Task Queue
//!
//! Durable queue of `fetch_dsym_url` tasks.
//!
//! ## Overview
//!
//! Each task carries a serialized [`FetchBuildRequest`]. The queue lives in
//! the registry database so pending work survives restarts.
//!
//! ## Features
//!
//! - **Deduplication**: at most one pending or processing task per build
//! - **Atomic Claims**: a task is moved to `processing` by a single statement
//! - **Retry Logic**: retryable failures come back after exponential backoff
//! - **Recovery**: tasks left `processing` by a dead worker can be requeued
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::{TaskQueue, FetchBuildRequest};
//!
//! let queue = TaskQueue::new(pool.clone(), 3).await?;
//! queue.enqueue(&FetchBuildRequest::new(&application, build)).await?;
//!
//! while let Some(task) = queue.dequeue().await? {
//!     match fetcher.fetch_build(&task.request).await {
//!         Ok(_) => queue.mark_complete(task.id).await?,
//!         Err(e) => { queue.mark_failed(task.id, &e).await?; }
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::fetch_task::FetchBuildRequest;
use crate::jobs::FETCH_JOB_NAME;

/// Default number of attempts before a retryable task fails for good
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay in milliseconds
const INITIAL_BACKOFF_MS: i64 = 100;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Type-safe build task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildTaskId(Uuid);

impl BuildTaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidTask(format!("task id {:?}: {}", s, e)))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BuildTaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BuildTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BuildTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl std::str::FromStr for BuildTaskStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

/// A queued fetch of one build's debug symbols
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTask {
    pub id: BuildTaskId,
    pub task_name: String,
    /// `project:app:build`; unique among active tasks
    pub dedup_key: String,
    pub request: FetchBuildRequest,
    pub status: BuildTaskStatus,
    /// Failed attempts so far
    pub retry_count: u32,
    pub error_message: Option<String>,
    /// Earliest claim time, Unix milliseconds
    pub available_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub processing_started_at: Option<i64>,
}

impl BuildTask {
    pub fn new(request: FetchBuildRequest) -> Self {
        let now = now_ms();
        Self {
            id: BuildTaskId::new(),
            task_name: FETCH_JOB_NAME.to_string(),
            dedup_key: request.dedup_key(),
            request,
            status: BuildTaskStatus::Pending,
            retry_count: 0,
            error_message: None,
            available_at: now,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
        }
    }

    /// Backoff before the next attempt: 100ms, 200ms, 400ms, ...
    pub fn next_retry_delay_ms(&self) -> i64 {
        INITIAL_BACKOFF_MS.saturating_mul(1i64 << self.retry_count.min(30))
    }

    /// Record a failed attempt; returns whether the task goes back to pending.
    fn fail(&mut self, error: &SyncError, max_attempts: u32) -> bool {
        let now = now_ms();
        let will_retry = error.is_retryable() && self.retry_count + 1 < max_attempts;
        let delay = self.next_retry_delay_ms();

        self.retry_count += 1;
        self.error_message = Some(error.to_string());
        self.updated_at = now;
        self.processing_started_at = None;

        if will_retry {
            self.status = BuildTaskStatus::Pending;
            self.available_at = now + delay;
        } else {
            self.status = BuildTaskStatus::Failed;
        }
        will_retry
    }

    fn complete(&mut self) {
        self.status = BuildTaskStatus::Completed;
        self.error_message = None;
        self.updated_at = now_ms();
    }
}

// =============================================================================
// Repository
// =============================================================================

#[async_trait]
pub trait BuildTaskRepository: Send + Sync {
    /// Insert unless an active task with the same dedup key exists.
    ///
    /// Returns `false` when the insert was ignored.
    async fn insert_if_absent(&self, task: &BuildTask) -> Result<bool>;

    async fn update(&self, task: &BuildTask) -> Result<()>;

    async fn find_by_id(&self, id: BuildTaskId) -> Result<Option<BuildTask>>;

    /// Atomically move the oldest available pending task to `processing`.
    async fn claim_next(&self, now_ms: i64) -> Result<Option<BuildTask>>;

    async fn count_by_status(&self, status: BuildTaskStatus) -> Result<u64>;

    /// Return every `processing` task to `pending`.
    async fn requeue_processing(&self, now_ms: i64) -> Result<u64>;

    /// Return `processing` tasks claimed before `started_before_ms` to `pending`.
    async fn requeue_processing_started_before(
        &self,
        started_before_ms: i64,
        now_ms: i64,
    ) -> Result<u64>;

    async fn delete_completed(&self) -> Result<u64>;

    async fn get_failed_tasks(&self) -> Result<Vec<BuildTask>>;
}

pub struct SqliteBuildTaskRepository {
    pool: SqlitePool,
}

const TASK_COLUMNS: &str = "id, task_name, dedup_key, payload, status, retry_count, error_message, \
     available_at, created_at, updated_at, processing_started_at";

#[derive(Debug, FromRow)]
struct BuildTaskRow {
    id: String,
    task_name: String,
    dedup_key: String,
    payload: String,
    status: String,
    retry_count: i64,
    error_message: Option<String>,
    available_at: i64,
    created_at: i64,
    updated_at: i64,
    processing_started_at: Option<i64>,
}

impl TryFrom<BuildTaskRow> for BuildTask {
    type Error = SyncError;

    fn try_from(row: BuildTaskRow) -> Result<Self> {
        Ok(Self {
            id: BuildTaskId::from_string(&row.id)?,
            task_name: row.task_name,
            dedup_key: row.dedup_key,
            request: serde_json::from_str(&row.payload)?,
            status: row.status.parse()?,
            retry_count: u32::try_from(row.retry_count).unwrap_or(u32::MAX),
            error_message: row.error_message,
            available_at: row.available_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            processing_started_at: row.processing_started_at,
        })
    }
}

fn db_error(e: sqlx::Error) -> SyncError {
    SyncError::Database(e.to_string())
}

impl SqliteBuildTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the queue table and its indexes if they don't exist
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS build_tasks (
                id TEXT PRIMARY KEY,
                task_name TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                available_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                processing_started_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_build_tasks_active_dedup
            ON build_tasks(dedup_key)
            WHERE status IN ('pending', 'processing')
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_build_tasks_status_available
            ON build_tasks(status, available_at, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

#[async_trait]
impl BuildTaskRepository for SqliteBuildTaskRepository {
    async fn insert_if_absent(&self, task: &BuildTask) -> Result<bool> {
        let payload = serde_json::to_string(&task.request)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO build_tasks (
                id, task_name, dedup_key, payload, status, retry_count, error_message,
                available_at, created_at, updated_at, processing_started_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.as_str())
        .bind(&task.task_name)
        .bind(&task.dedup_key)
        .bind(payload)
        .bind(task.status.as_str())
        .bind(i64::from(task.retry_count))
        .bind(&task.error_message)
        .bind(task.available_at)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.processing_started_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, task: &BuildTask) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE build_tasks SET
                status = ?,
                retry_count = ?,
                error_message = ?,
                available_at = ?,
                updated_at = ?,
                processing_started_at = ?
            WHERE id = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(i64::from(task.retry_count))
        .bind(&task.error_message)
        .bind(task.available_at)
        .bind(task.updated_at)
        .bind(task.processing_started_at)
        .bind(task.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: BuildTaskId) -> Result<Option<BuildTask>> {
        let sql = format!("SELECT {} FROM build_tasks WHERE id = ?", TASK_COLUMNS);
        sqlx::query_as::<_, BuildTaskRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(BuildTask::try_from)
            .transpose()
    }

    async fn claim_next(&self, now_ms: i64) -> Result<Option<BuildTask>> {
        let sql = format!(
            r#"
            UPDATE build_tasks
            SET status = 'processing', processing_started_at = ?1, updated_at = ?1
            WHERE id = (
                SELECT id FROM build_tasks
                WHERE status = 'pending' AND available_at <= ?1
                ORDER BY available_at ASC, created_at ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        sqlx::query_as::<_, BuildTaskRow>(&sql)
            .bind(now_ms)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(BuildTask::try_from)
            .transpose()
    }

    async fn count_by_status(&self, status: BuildTaskStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM build_tasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(count as u64)
    }

    async fn requeue_processing(&self, now_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE build_tasks
            SET status = 'pending', processing_started_at = NULL,
                available_at = ?1, updated_at = ?1
            WHERE status = 'processing'
            "#,
        )
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn requeue_processing_started_before(
        &self,
        started_before_ms: i64,
        now_ms: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE build_tasks
            SET status = 'pending', processing_started_at = NULL,
                available_at = ?2, updated_at = ?2
            WHERE status = 'processing'
              AND (processing_started_at IS NULL OR processing_started_at < ?1)
            "#,
        )
        .bind(started_before_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_completed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM build_tasks WHERE status = 'completed'")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn get_failed_tasks(&self) -> Result<Vec<BuildTask>> {
        let sql = format!(
            "SELECT {} FROM build_tasks WHERE status = 'failed' ORDER BY updated_at DESC",
            TASK_COLUMNS
        );
        sqlx::query_as::<_, BuildTaskRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(BuildTask::try_from)
            .collect()
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Result of [`TaskQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued(BuildTaskId),
    /// An active task for the same build already exists
    AlreadyQueued,
}

/// Queue of build fetch tasks
pub struct TaskQueue {
    repository: Arc<dyn BuildTaskRepository>,
    max_attempts: u32,
}

impl TaskQueue {
    /// Open the queue on `pool`, creating its table if needed
    pub async fn new(pool: SqlitePool, max_attempts: u32) -> Result<Self> {
        let repository = SqliteBuildTaskRepository::new(pool);
        repository.initialize().await?;
        Ok(Self::with_repository(Arc::new(repository), max_attempts))
    }

    pub fn with_repository(repository: Arc<dyn BuildTaskRepository>, max_attempts: u32) -> Self {
        Self {
            repository,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn enqueue(&self, request: &FetchBuildRequest) -> Result<EnqueueOutcome> {
        let task = BuildTask::new(request.clone());
        if self.repository.insert_if_absent(&task).await? {
            debug!(
                task_id = %task.id,
                dedup_key = %task.dedup_key,
                "Enqueued build task"
            );
            Ok(EnqueueOutcome::Queued(task.id))
        } else {
            debug!(dedup_key = %task.dedup_key, "Build task already queued");
            Ok(EnqueueOutcome::AlreadyQueued)
        }
    }

    /// Claim the next task whose backoff has elapsed
    pub async fn dequeue(&self) -> Result<Option<BuildTask>> {
        let task = self.repository.claim_next(now_ms()).await?;
        if let Some(task) = &task {
            debug!(
                task_id = %task.id,
                dedup_key = %task.dedup_key,
                retry_count = task.retry_count,
                "Dequeued build task"
            );
        }
        Ok(task)
    }

    pub async fn mark_complete(&self, task_id: BuildTaskId) -> Result<()> {
        let mut task = self.find(task_id).await?;
        task.complete();
        self.repository.update(&task).await?;

        debug!(task_id = %task_id, "Build task completed");
        Ok(())
    }

    /// Record a failed attempt and return the task's new status
    pub async fn mark_failed(&self, task_id: BuildTaskId, error: &SyncError) -> Result<BuildTaskStatus> {
        let mut task = self.find(task_id).await?;
        let will_retry = task.fail(error, self.max_attempts);
        self.repository.update(&task).await?;

        if will_retry {
            warn!(
                task_id = %task_id,
                dedup_key = %task.dedup_key,
                retry_count = task.retry_count,
                max_attempts = self.max_attempts,
                backoff_ms = task.available_at - task.updated_at,
                error = %error,
                "Build task failed, will retry"
            );
        } else {
            warn!(
                task_id = %task_id,
                dedup_key = %task.dedup_key,
                retry_count = task.retry_count,
                retryable = error.is_retryable(),
                error = %error,
                "Build task failed permanently"
            );
        }

        Ok(task.status)
    }

    /// Return tasks abandoned in `processing` to the queue
    pub async fn requeue_stale(&self) -> Result<u64> {
        let requeued = self.repository.requeue_processing(now_ms()).await?;
        if requeued > 0 {
            info!(requeued, "Requeued interrupted build tasks");
        }
        Ok(requeued)
    }

    /// Requeue `processing` tasks claimed longer than `max_age` ago.
    ///
    /// A live worker finishes or fails every task within its time limit, so
    /// an older claim belongs to a drain that was dropped.
    pub async fn requeue_expired(&self, max_age: Duration) -> Result<u64> {
        let now = now_ms();
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let requeued = self
            .repository
            .requeue_processing_started_before(now.saturating_sub(max_age_ms), now)
            .await?;
        if requeued > 0 {
            warn!(requeued, "Requeued build tasks abandoned past their time limit");
        }
        Ok(requeued)
    }

    pub async fn get_status(&self, task_id: BuildTaskId) -> Result<Option<BuildTask>> {
        self.repository.find_by_id(task_id).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self
                .repository
                .count_by_status(BuildTaskStatus::Pending)
                .await?,
            processing: self
                .repository
                .count_by_status(BuildTaskStatus::Processing)
                .await?,
            completed: self
                .repository
                .count_by_status(BuildTaskStatus::Completed)
                .await?,
            failed: self
                .repository
                .count_by_status(BuildTaskStatus::Failed)
                .await?,
        })
    }

    pub async fn cleanup_completed(&self) -> Result<u64> {
        let deleted = self.repository.delete_completed().await?;
        info!(deleted_count = deleted, "Cleaned up completed build tasks");
        Ok(deleted)
    }

    pub async fn get_failed_tasks(&self) -> Result<Vec<BuildTask>> {
        self.repository.get_failed_tasks().await
    }

    async fn find(&self, task_id: BuildTaskId) -> Result<BuildTask> {
        self.repository
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity_type: "BuildTask".to_string(),
                id: task_id.to_string(),
            })
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    /// Permanently failed tasks
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }

    /// No pending or in-flight tasks
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}
