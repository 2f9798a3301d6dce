//! # Sync Configuration Module
//!
//! Provides configuration management for the debug symbol sync service.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `SyncConfig`
//! holding paths, timeouts, job limits and the injected HTTP client. Validation
//! is fail-fast: `build()` refuses inconsistent values with an actionable
//! message instead of letting a sync run discover them later.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite database holding applications, bundles and tasks
//! - `symbol_store_dir` - Root directory for project-scoped stored symbol files
//!
//! ## Optional Settings (with defaults)
//!
//! | Setting | Default |
//! |---------|---------|
//! | `spool_dir` | `<symbol_store_dir>/.spool` |
//! | `http_timeout` | 30 s |
//! | `fetch_timeout` | 120 s |
//! | `sync_interval` | 3600 s |
//! | `sync_soft_limit` / `sync_hard_limit` | 60 s / 90 s |
//! | `fetch_interval` | 5 s |
//! | `fetch_task_time_limit` | 300 s |
//! | `fetch_concurrency` | 4 |
//! | `max_task_attempts` | 3 |
//!
//! When the `desktop-shims` feature is enabled, a reqwest-backed `HttpClient`
//! is injected if none is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncConfig;
//! use std::time::Duration;
//!
//! let config = SyncConfig::builder()
//!     .database_path("/var/lib/dsym-sync/sync.db")
//!     .symbol_store_dir("/var/lib/dsym-sync/symbols")
//!     .fetch_timeout(Duration::from_secs(180))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_SYNC_SOFT_LIMIT: Duration = Duration::from_secs(60);
pub const DEFAULT_SYNC_HARD_LIMIT: Duration = Duration::from_secs(90);
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FETCH_TASK_TIME_LIMIT: Duration = Duration::from_secs(300);
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_TASK_ATTEMPTS: u32 = 3;

const SPOOL_SUBDIR: &str = ".spool";

/// Configuration for the debug symbol sync service.
///
/// Use [`SyncConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct SyncConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Root directory for stored symbol files (`<root>/<project_id>/<file_id>`)
    pub symbol_store_dir: PathBuf,

    /// Directory for temporary archive downloads
    pub spool_dir: PathBuf,

    /// Default timeout for catalog API calls
    pub http_timeout: Duration,

    /// Timeout for a single archive download
    pub fetch_timeout: Duration,

    /// How often the orchestrator job runs
    pub sync_interval: Duration,

    /// Cooperative deadline for one orchestrator run
    pub sync_soft_limit: Duration,

    /// Forced deadline for one orchestrator run
    pub sync_hard_limit: Duration,

    /// How often the build-task worker drains the queue
    pub fetch_interval: Duration,

    /// Forced deadline for a single build task
    pub fetch_task_time_limit: Duration,

    /// Maximum number of build tasks processed concurrently
    pub fetch_concurrency: usize,

    /// Attempts before a retryable task is marked failed
    pub max_task_attempts: u32,

    /// HTTP client (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("database_path", &self.database_path)
            .field("symbol_store_dir", &self.symbol_store_dir)
            .field("spool_dir", &self.spool_dir)
            .field("http_timeout", &self.http_timeout)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("sync_interval", &self.sync_interval)
            .field("sync_soft_limit", &self.sync_soft_limit)
            .field("sync_hard_limit", &self.sync_hard_limit)
            .field("fetch_interval", &self.fetch_interval)
            .field("fetch_task_time_limit", &self.fetch_task_time_limit)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("max_task_attempts", &self.max_task_attempts)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .finish()
    }
}

impl SyncConfig {
    /// Creates a new builder for constructing a `SyncConfig`.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Paths are not empty
    /// - Timeouts and intervals are non-zero
    /// - The sync soft limit fires before the hard limit
    /// - Worker concurrency and attempt counts are at least 1
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.symbol_store_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Symbol store directory cannot be empty".to_string(),
            ));
        }

        if self.spool_dir.as_os_str().is_empty() {
            return Err(Error::Config("Spool directory cannot be empty".to_string()));
        }

        for (name, value) in [
            ("http_timeout", self.http_timeout),
            ("fetch_timeout", self.fetch_timeout),
            ("sync_interval", self.sync_interval),
            ("sync_soft_limit", self.sync_soft_limit),
            ("fetch_interval", self.fetch_interval),
            ("fetch_task_time_limit", self.fetch_task_time_limit),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        if self.sync_soft_limit >= self.sync_hard_limit {
            return Err(Error::Config(format!(
                "sync_soft_limit ({:?}) must be below sync_hard_limit ({:?}); \
                 the soft limit lets a run stop cleanly before it is abandoned",
                self.sync_soft_limit, self.sync_hard_limit
            )));
        }

        if self.fetch_timeout >= self.fetch_task_time_limit {
            return Err(Error::Config(format!(
                "fetch_timeout ({:?}) must be below fetch_task_time_limit ({:?}) \
                 so a slow download fails before its task is abandoned",
                self.fetch_timeout, self.fetch_task_time_limit
            )));
        }

        if self.fetch_concurrency == 0 {
            return Err(Error::Config(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }

        if self.max_task_attempts == 0 {
            return Err(Error::Config(
                "max_task_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Option<Arc<dyn HttpClient>>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout).map_err(|e| {
        Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: format!("Default reqwest client could not be created: {}", e),
        }
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(Some(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

/// Builder for [`SyncConfig`].
#[derive(Default)]
pub struct SyncConfigBuilder {
    database_path: Option<PathBuf>,
    symbol_store_dir: Option<PathBuf>,
    spool_dir: Option<PathBuf>,
    http_timeout: Option<Duration>,
    fetch_timeout: Option<Duration>,
    sync_interval: Option<Duration>,
    sync_soft_limit: Option<Duration>,
    sync_hard_limit: Option<Duration>,
    fetch_interval: Option<Duration>,
    fetch_task_time_limit: Option<Duration>,
    fetch_concurrency: Option<usize>,
    max_task_attempts: Option<u32>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl SyncConfigBuilder {
    /// Sets the SQLite database path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the symbol storage root (required).
    pub fn symbol_store_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.symbol_store_dir = Some(path.into());
        self
    }

    /// Sets the spool directory for temporary downloads.
    ///
    /// Defaults to a `.spool` directory under the symbol store so the spool
    /// file and the stored files share a filesystem.
    pub fn spool_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.spool_dir = Some(path.into());
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    pub fn sync_limits(mut self, soft: Duration, hard: Duration) -> Self {
        self.sync_soft_limit = Some(soft);
        self.sync_hard_limit = Some(hard);
        self
    }

    pub fn fetch_interval(mut self, interval: Duration) -> Self {
        self.fetch_interval = Some(interval);
        self
    }

    pub fn fetch_task_time_limit(mut self, limit: Duration) -> Self {
        self.fetch_task_time_limit = Some(limit);
        self
    }

    pub fn fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = Some(concurrency);
        self
    }

    pub fn max_task_attempts(mut self, attempts: u32) -> Self {
        self.max_task_attempts = Some(attempts);
        self
    }

    /// Injects an HTTP client implementation.
    ///
    /// Without one, the `desktop-shims` feature supplies a reqwest client
    /// using `http_timeout` as its default timeout.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the final `SyncConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required path is missing or a value is
    /// inconsistent, and [`Error::CapabilityMissing`] when the default HTTP
    /// client cannot be created.
    pub fn build(self) -> Result<SyncConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let symbol_store_dir = self.symbol_store_dir.ok_or_else(|| {
            Error::Config(
                "Symbol store directory is required. Use .symbol_store_dir() to set it."
                    .to_string(),
            )
        })?;

        let spool_dir = self
            .spool_dir
            .unwrap_or_else(|| symbol_store_dir.join(SPOOL_SUBDIR));

        let http_timeout = self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client(http_timeout)?,
        };

        let config = SyncConfig {
            database_path,
            symbol_store_dir,
            spool_dir,
            http_timeout,
            fetch_timeout: self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            sync_interval: self.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL),
            sync_soft_limit: self.sync_soft_limit.unwrap_or(DEFAULT_SYNC_SOFT_LIMIT),
            sync_hard_limit: self.sync_hard_limit.unwrap_or(DEFAULT_SYNC_HARD_LIMIT),
            fetch_interval: self.fetch_interval.unwrap_or(DEFAULT_FETCH_INTERVAL),
            fetch_task_time_limit: self
                .fetch_task_time_limit
                .unwrap_or(DEFAULT_FETCH_TASK_TIME_LIMIT),
            fetch_concurrency: self.fetch_concurrency.unwrap_or(DEFAULT_FETCH_CONCURRENCY),
            max_task_attempts: self.max_task_attempts.unwrap_or(DEFAULT_MAX_TASK_ATTEMPTS),
            http_client,
        };

        config.validate()?;

        Ok(config)
    }
}
