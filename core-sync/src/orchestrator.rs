//! # Sync Orchestrator
//!
//! The scheduled discover-and-dispatch routine.
//!
//! ## Workflow
//!
//! For every project with an enabled catalog integration:
//! 1. Build the project's catalog client; an unusable integration is skipped
//!    with a warning
//! 2. List the catalog's applications and upsert each one
//! 3. List each application's builds and enqueue one fetch task per build
//!    that has no registered bundle yet
//!
//! Projects are processed one after another. A project that fails is logged
//! and counted; the run moves on to the next one. The same holds for one
//! application's build listing within a project.
//!
//! ## Time limits
//!
//! Once the soft limit of the run's [`RunBudget`] has passed, no new project
//! or application is started and the report is flagged `interrupted`. The hard
//! limit is enforced by the scheduler; every step is idempotent, so the next
//! run picks up where an aborted one stopped.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let report = orchestrator.run(&RunBudget::start(limits)).await?;
//! info!(dispatched = report.builds_dispatched, "Sync finished");
//! ```

use crate::catalog::CatalogClientResolver;
use crate::error::{Result, SyncError};
use crate::fetch_task::FetchBuildRequest;
use crate::task_queue::{EnqueueOutcome, TaskQueue};
use bridge_traits::background::RunBudget;
use bridge_traits::catalog::CatalogClient;
use core_registry::{
    Application, ApplicationRepository, BundleRepository, IntegrationRepository,
    IntegrationSettings,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Summary of one orchestrator run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunReport {
    /// Projects with an enabled integration
    pub projects_seen: u64,
    pub projects_synced: u64,
    /// Projects whose integration is unusable
    pub projects_skipped: u64,
    pub projects_failed: u64,
    pub applications_upserted: u64,
    pub builds_dispatched: u64,
    /// Builds skipped because their bundle is already registered
    pub builds_already_synced: u64,
    /// Builds that already had an active task
    pub builds_already_queued: u64,
    /// The soft limit cut the run short
    pub interrupted: bool,
}

/// How a single project's sync ended
enum ProjectOutcome {
    Synced,
    /// Finished the current application, then stopped for the soft limit
    Interrupted,
}

pub struct SyncOrchestrator {
    integrations: Arc<dyn IntegrationRepository>,
    applications: Arc<dyn ApplicationRepository>,
    bundles: Arc<dyn BundleRepository>,
    resolver: Arc<CatalogClientResolver>,
    queue: Arc<TaskQueue>,
}

impl SyncOrchestrator {
    pub fn new(
        integrations: Arc<dyn IntegrationRepository>,
        applications: Arc<dyn ApplicationRepository>,
        bundles: Arc<dyn BundleRepository>,
        resolver: Arc<CatalogClientResolver>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            integrations,
            applications,
            bundles,
            resolver,
            queue,
        }
    }

    /// Run one sync pass over every enabled project.
    ///
    /// # Errors
    ///
    /// Only when the enabled integrations cannot be listed. Failures of
    /// individual projects are reported in [`SyncRunReport`].
    #[instrument(skip(self, budget))]
    pub async fn run(&self, budget: &RunBudget) -> Result<SyncRunReport> {
        let projects = self.integrations.list_enabled().await?;
        let mut report = SyncRunReport {
            projects_seen: projects.len() as u64,
            ..SyncRunReport::default()
        };

        info!(projects = projects.len(), "Starting debug symbol sync");

        for settings in &projects {
            if budget.soft_limit_reached() {
                report.interrupted = true;
                break;
            }

            match self.sync_project(settings, budget, &mut report).await {
                Ok(ProjectOutcome::Synced) => report.projects_synced += 1,
                Ok(ProjectOutcome::Interrupted) => {
                    report.interrupted = true;
                    break;
                }
                Err(SyncError::Configuration(message)) => {
                    warn!(
                        project_id = %settings.project_id,
                        reason = %message,
                        "Skipping project with unusable catalog integration"
                    );
                    report.projects_skipped += 1;
                }
                Err(e) => {
                    error!(
                        project_id = %settings.project_id,
                        error = %e,
                        "Project sync failed"
                    );
                    report.projects_failed += 1;
                }
            }
        }

        if report.interrupted {
            warn!(
                elapsed_ms = budget.elapsed().as_millis() as u64,
                "Soft time limit reached, stopping sync early"
            );
        }

        info!(
            projects_synced = report.projects_synced,
            projects_skipped = report.projects_skipped,
            projects_failed = report.projects_failed,
            applications_upserted = report.applications_upserted,
            builds_dispatched = report.builds_dispatched,
            builds_already_synced = report.builds_already_synced,
            builds_already_queued = report.builds_already_queued,
            interrupted = report.interrupted,
            "Debug symbol sync finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(project_id = %settings.project_id))]
    async fn sync_project(
        &self,
        settings: &IntegrationSettings,
        budget: &RunBudget,
        report: &mut SyncRunReport,
    ) -> Result<ProjectOutcome> {
        let client = self.resolver.client_for(settings)?;
        let remote_apps = client.list_applications().await?;
        debug!(applications = remote_apps.len(), "Listed catalog applications");

        let mut failed_apps = 0u64;
        for remote in &remote_apps {
            if budget.soft_limit_reached() {
                return Ok(ProjectOutcome::Interrupted);
            }

            let candidate = Application::from_catalog(settings.project_id.clone(), remote);
            if let Err(reason) = candidate.validate() {
                warn!(remote_app_id = %remote.id, %reason, "Ignoring invalid catalog application");
                continue;
            }

            let application = self.applications.upsert(&candidate).await?;
            report.applications_upserted += 1;

            match self.dispatch_builds(client.as_ref(), &application, report).await {
                Ok(()) => {}
                Err(e @ SyncError::Database(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        remote_app_id = %application.remote_app_id,
                        error = %e,
                        "Failed to dispatch builds for application"
                    );
                    failed_apps += 1;
                }
            }
        }

        if failed_apps > 0 {
            return Err(SyncError::Transport(format!(
                "{} of {} applications could not be listed",
                failed_apps,
                remote_apps.len()
            )));
        }
        Ok(ProjectOutcome::Synced)
    }

    async fn dispatch_builds(
        &self,
        client: &dyn CatalogClient,
        application: &Application,
        report: &mut SyncRunReport,
    ) -> Result<()> {
        let builds = client.list_builds(&application.remote_app_id).await?;
        debug!(
            remote_app_id = %application.remote_app_id,
            builds = builds.len(),
            "Listed builds"
        );

        for build in builds {
            if self.bundles.exists(&application.id, &build.build_id).await? {
                report.builds_already_synced += 1;
                continue;
            }

            let request = FetchBuildRequest::new(application, build);
            match self.queue.enqueue(&request).await? {
                EnqueueOutcome::Queued(_) => report.builds_dispatched += 1,
                EnqueueOutcome::AlreadyQueued => report.builds_already_queued += 1,
            }
        }
        Ok(())
    }
}
