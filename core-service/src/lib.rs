//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided bridges (HTTP and the catalog client
//! factory) into the registry and the sync engine, and exposes the two
//! background jobs to a scheduler. Server and desktop hosts enable the
//! `desktop-shims` feature, which supplies the reqwest HTTP client, the
//! iTunes Connect catalog client and the Tokio scheduler.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_desktop::TokioJobScheduler;
//! use core_runtime::SyncConfig;
//!
//! let config = SyncConfig::builder()
//!     .database_path("/var/lib/dsym-sync/sync.db")
//!     .symbol_store_dir("/var/lib/dsym-sync/symbols")
//!     .build()?;
//!
//! let service = core_service::bootstrap(config).await?;
//! let scheduler = TokioJobScheduler::new();
//! service.start(&scheduler).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::path::Path;
use std::sync::Arc;

use bridge_traits::{background::RunBudget, catalog::CatalogClientFactory, http::HttpClient};
use core_registry::{
    create_pool, Application, ApplicationId, ApplicationRepository, BundleRepository,
    DatabaseConfig, IntegrationRepository, IntegrationSettings, ProjectId,
    SqliteApplicationRepository, SqliteBundleRepository, SqliteIntegrationRepository,
};
use core_runtime::SyncConfig;
use core_sync::{
    BuildFetcher, BuildTask, BuildTaskWorker, CatalogClientResolver, DebugArchiveUnpacker,
    DrainReport, QueueStats, SymbolPipeline, SyncOrchestrator, SyncRunReport, TaskQueue,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "desktop-shims")]
use bridge_desktop::TokioJobScheduler;
#[cfg(feature = "desktop-shims")]
use bridge_traits::{
    background::{JobId, JobScheduler},
    error::BridgeError,
};
#[cfg(feature = "desktop-shims")]
use core_sync::{fetch_job_spec, sync_job_spec, FETCH_JOB_NAME, SYNC_JOB_NAME};

/// Bridge handles the service cannot build on its own.
pub struct ServiceDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub catalog_factory: Arc<dyn CatalogClientFactory>,
}

impl ServiceDependencies {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        catalog_factory: Arc<dyn CatalogClientFactory>,
    ) -> Self {
        Self {
            http_client,
            catalog_factory,
        }
    }
}

/// Point-in-time view of the service for hosts and health endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub queue: QueueStats,
    pub last_sync: Option<SyncRunReport>,
    pub last_drain: Option<DrainReport>,
}

#[derive(Default)]
struct LastRuns {
    sync: Option<SyncRunReport>,
    drain: Option<DrainReport>,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SymbolSyncService {
    config: Arc<SyncConfig>,
    integrations: Arc<dyn IntegrationRepository>,
    applications: Arc<dyn ApplicationRepository>,
    bundles: Arc<dyn BundleRepository>,
    queue: Arc<TaskQueue>,
    orchestrator: Arc<SyncOrchestrator>,
    worker: Arc<BuildTaskWorker>,
    last_runs: Arc<RwLock<LastRuns>>,
}

impl SymbolSyncService {
    /// Open the database, wire the sync stack and recover tasks left
    /// in flight by a previous process.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid, a storage directory cannot
    /// be created, or the database cannot be opened or migrated.
    #[instrument(skip(config, deps), fields(database = %config.database_path.display()))]
    pub async fn new(config: SyncConfig, deps: ServiceDependencies) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent() {
            ensure_dir(parent).await?;
        }
        ensure_dir(&config.symbol_store_dir).await?;
        ensure_dir(&config.spool_dir).await?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;

        let integrations: Arc<dyn IntegrationRepository> =
            Arc::new(SqliteIntegrationRepository::new(pool.clone()));
        let applications: Arc<dyn ApplicationRepository> =
            Arc::new(SqliteApplicationRepository::new(pool.clone()));
        let bundles: Arc<dyn BundleRepository> =
            Arc::new(SqliteBundleRepository::new(pool.clone()));
        let queue = Arc::new(TaskQueue::new(pool, config.max_task_attempts).await?);

        let resolver = Arc::new(CatalogClientResolver::new(
            Arc::clone(&integrations),
            deps.catalog_factory,
        ));
        let pipeline = Arc::new(
            SymbolPipeline::new(
                deps.http_client,
                Arc::new(DebugArchiveUnpacker::new(&config.symbol_store_dir)),
                Arc::clone(&bundles),
                &config.spool_dir,
            )
            .with_fetch_options(bridge_traits::http::FetchOptions::with_timeout(
                config.fetch_timeout,
            )),
        );
        let fetcher = Arc::new(BuildFetcher::new(
            Arc::clone(&applications),
            Arc::clone(&bundles),
            Arc::clone(&resolver),
            pipeline,
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&integrations),
            Arc::clone(&applications),
            Arc::clone(&bundles),
            resolver,
            Arc::clone(&queue),
        ));
        let worker = Arc::new(
            BuildTaskWorker::new(Arc::clone(&queue), fetcher, config.fetch_concurrency)
                .with_task_time_limit(config.fetch_task_time_limit),
        );

        let recovered = worker.recover().await?;
        if recovered > 0 {
            warn!(recovered, "Requeued build tasks left in flight");
        }

        info!("Symbol sync service ready");

        Ok(Self {
            config: Arc::new(config),
            integrations,
            applications,
            bundles,
            queue,
            orchestrator,
            worker,
            last_runs: Arc::new(RwLock::new(LastRuns::default())),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Insert or replace a project's catalog integration.
    pub async fn configure_integration(&self, settings: &IntegrationSettings) -> Result<()> {
        self.integrations.upsert(settings).await?;
        info!(project_id = %settings.project_id, enabled = settings.enabled, "Integration saved");
        Ok(())
    }

    pub async fn set_integration_enabled(&self, project_id: &ProjectId, enabled: bool) -> Result<()> {
        self.integrations.set_enabled(project_id, enabled).await?;
        Ok(())
    }

    /// One discovery pass over every enabled project.
    pub async fn run_sync(&self, budget: &RunBudget) -> Result<SyncRunReport> {
        let report = self.orchestrator.run(budget).await?;
        self.last_runs.write().await.sync = Some(report);
        Ok(report)
    }

    /// Process queued build tasks until the queue is empty or the soft
    /// limit is reached.
    pub async fn drain(&self, budget: &RunBudget) -> Result<DrainReport> {
        let report = self.worker.drain(budget).await?;
        self.last_runs.write().await.drain = Some(report);
        Ok(report)
    }

    /// One run of the fetch job: drain the queue, then prune completed
    /// tasks. Failed tasks are kept for inspection.
    pub async fn run_fetch_job(&self, budget: &RunBudget) -> Result<DrainReport> {
        let report = self.drain(budget).await?;
        let pruned = self.queue.cleanup_completed().await?;
        debug!(pruned, "Pruned completed build tasks");
        Ok(report)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        Ok(self.queue.stats().await?)
    }

    pub async fn failed_tasks(&self) -> Result<Vec<BuildTask>> {
        Ok(self.queue.get_failed_tasks().await?)
    }

    /// Delete completed tasks, returning how many were removed.
    pub async fn cleanup_completed(&self) -> Result<u64> {
        Ok(self.queue.cleanup_completed().await?)
    }

    pub async fn applications(&self, project_id: &ProjectId) -> Result<Vec<Application>> {
        Ok(self.applications.list_for_project(project_id).await?)
    }

    pub async fn bundle_count(&self, application_id: &ApplicationId) -> Result<u64> {
        Ok(self.bundles.count_for_application(application_id).await?)
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let queue = self.queue_stats().await?;
        let last_runs = self.last_runs.read().await;
        Ok(ServiceStatus {
            queue,
            last_sync: last_runs.sync,
            last_drain: last_runs.drain,
        })
    }

    /// Register both job handlers and schedule them.
    ///
    /// Returns the ids of the sync job and the fetch job, in that order.
    #[cfg(feature = "desktop-shims")]
    pub async fn start(&self, scheduler: &TokioJobScheduler) -> Result<Vec<JobId>> {
        let service = self.clone();
        scheduler
            .register_job(SYNC_JOB_NAME, move |budget| {
                let service = service.clone();
                async move {
                    service
                        .run_sync(&budget)
                        .await
                        .map(|_| ())
                        .map_err(|e| BridgeError::OperationFailed(e.to_string()))
                }
            })
            .await;

        let service = self.clone();
        scheduler
            .register_job(FETCH_JOB_NAME, move |budget| {
                let service = service.clone();
                async move {
                    service
                        .run_fetch_job(&budget)
                        .await
                        .map(|_| ())
                        .map_err(|e| BridgeError::OperationFailed(e.to_string()))
                }
            })
            .await;

        let sync_id = scheduler
            .schedule_recurring(sync_job_spec(&self.config))
            .await?;
        let fetch_id = scheduler
            .schedule_recurring(fetch_job_spec(&self.config))
            .await?;

        info!(sync_job = %sync_id, fetch_job = %fetch_id, "Background jobs scheduled");
        Ok(vec![sync_id, fetch_id])
    }
}

async fn ensure_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        CoreError::InitializationFailed(format!("cannot create {}: {}", path.display(), e))
    })
}

/// Bootstrap with the iTunes Connect catalog client over the configured
/// HTTP client.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap(config: SyncConfig) -> Result<SymbolSyncService> {
    let http_client = config
        .http_client
        .clone()
        .ok_or_else(|| CoreError::CapabilityMissing {
            capability: "http_client".to_string(),
            message: "No HTTP client configured".to_string(),
        })?;
    let factory = Arc::new(provider_itunes_connect::ItunesConnectClientFactory::new(
        Arc::clone(&http_client),
    ));
    SymbolSyncService::new(config, ServiceDependencies::new(http_client, factory)).await
}
