//! # Build Fetch Task
//!
//! Fetches the debug symbols of one build of one application.
//!
//! ## Overview
//!
//! A [`FetchBuildRequest`] is the serialized payload the orchestrator
//! enqueues. [`BuildFetcher::fetch_build`] is the task body:
//!
//! 1. Resolve the application record; a missing record aborts the task
//! 2. Skip when a bundle already exists for (application, build)
//! 3. Resolve the project's catalog client and ask for the download URL
//! 4. Hand the URL to the [`SymbolPipeline`]
//!
//! The existence check is an optimisation only. Two tasks for the same
//! build can both pass it; the registry's uniqueness constraint decides
//! which one registers.

use crate::catalog::CatalogClientResolver;
use crate::error::{Result, SyncError};
use crate::pipeline::SymbolPipeline;
use bridge_traits::catalog::CatalogBuild;
use core_registry::{Application, ApplicationRepository, BundleId, BundleRepository, ProjectId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// The catalog-side identity of an application, as carried in a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRef {
    pub remote_app_id: String,
    pub name: String,
}

/// Payload of a `fetch_dsym_url` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchBuildRequest {
    pub project_id: ProjectId,
    pub app: AppRef,
    pub build: CatalogBuild,
}

impl FetchBuildRequest {
    pub fn new(application: &Application, build: CatalogBuild) -> Self {
        Self {
            project_id: application.project_id.clone(),
            app: AppRef {
                remote_app_id: application.remote_app_id.clone(),
                name: application.name.clone(),
            },
            build,
        }
    }

    /// Identity of the work, shared by every request for the same build.
    ///
    /// Each part is prefixed with its byte length, so ids containing the
    /// separator cannot collide.
    pub fn dedup_key(&self) -> String {
        [
            self.project_id.as_str(),
            self.app.remote_app_id.as_str(),
            self.build.build_id.as_str(),
        ]
        .iter()
        .map(|part| format!("{}:{}", part.len(), part))
        .collect::<Vec<_>>()
        .join("/")
    }
}

/// What a fetch task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A bundle already existed; nothing was downloaded.
    AlreadySynced,
    /// The archive was downloaded and registered.
    Registered { bundle_id: BundleId, files: usize },
    /// Another task registered the build between our check and our insert.
    ConcurrentlyRegistered,
}

pub struct BuildFetcher {
    applications: Arc<dyn ApplicationRepository>,
    bundles: Arc<dyn BundleRepository>,
    resolver: Arc<CatalogClientResolver>,
    pipeline: Arc<SymbolPipeline>,
}

impl BuildFetcher {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        bundles: Arc<dyn BundleRepository>,
        resolver: Arc<CatalogClientResolver>,
        pipeline: Arc<SymbolPipeline>,
    ) -> Self {
        Self {
            applications,
            bundles,
            resolver,
            pipeline,
        }
    }

    #[instrument(
        skip(self, request),
        fields(
            project_id = %request.project_id,
            remote_app_id = %request.app.remote_app_id,
            build_id = %request.build.build_id
        )
    )]
    pub async fn fetch_build(&self, request: &FetchBuildRequest) -> Result<FetchOutcome> {
        let application = self
            .applications
            .find_by_remote_id(&request.project_id, &request.app.remote_app_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity_type: "Application".to_string(),
                id: request.app.remote_app_id.clone(),
            })?;

        if self
            .bundles
            .exists(&application.id, &request.build.build_id)
            .await?
        {
            debug!("Bundle already registered, skipping download");
            return Ok(FetchOutcome::AlreadySynced);
        }

        let client = self.resolver.resolve(&request.project_id).await?;
        let build = &request.build;
        let url = client
            .get_download_url(
                &application.remote_app_id,
                &build.platform,
                &build.version,
                &build.build_id,
            )
            .await?;

        self.pipeline
            .download_and_register(&application, build, &url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{factory_for, macho_zip, MockCatalog, MockFactory, MockHttp};
    use crate::unpacker::DebugArchiveUnpacker;
    use bridge_traits::catalog::CatalogClient;
    use bridge_traits::error::BridgeError;
    use core_registry::{
        create_test_pool, IntegrationRepository, IntegrationSettings, SqliteApplicationRepository,
        SqliteBundleRepository, SqliteIntegrationRepository,
    };

    struct Harness {
        _dir: tempfile::TempDir,
        fetcher: BuildFetcher,
        applications: Arc<SqliteApplicationRepository>,
        bundles: Arc<SqliteBundleRepository>,
    }

    async fn harness(catalog: MockCatalog, http: MockHttp) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_test_pool().await.unwrap();

        let integrations = SqliteIntegrationRepository::new(pool.clone());
        integrations
            .upsert(&IntegrationSettings::new(ProjectId::from("p1"), "https://api", "tok"))
            .await
            .unwrap();

        let applications = Arc::new(SqliteApplicationRepository::new(pool.clone()));
        let bundles = Arc::new(SqliteBundleRepository::new(pool));
        let factory: MockFactory = factory_for(Arc::new(catalog) as Arc<dyn CatalogClient>);
        let resolver = Arc::new(CatalogClientResolver::new(
            Arc::new(integrations),
            Arc::new(factory),
        ));
        let pipeline = Arc::new(SymbolPipeline::new(
            Arc::new(http),
            Arc::new(DebugArchiveUnpacker::new(dir.path().join("store"))),
            bundles.clone(),
            dir.path().join("spool"),
        ));

        Harness {
            fetcher: BuildFetcher::new(applications.clone(), bundles.clone(), resolver, pipeline),
            _dir: dir,
            applications,
            bundles,
        }
    }

    async fn seed_app(h: &Harness) -> Application {
        h.applications
            .upsert(&Application::new(ProjectId::from("p1"), "app1", "Example"))
            .await
            .unwrap()
    }

    fn request(build_id: &str) -> FetchBuildRequest {
        FetchBuildRequest {
            project_id: ProjectId::from("p1"),
            app: AppRef {
                remote_app_id: "app1".to_string(),
                name: "Example".to_string(),
            },
            build: CatalogBuild::new(build_id, "1.0", "ios"),
        }
    }

    #[test]
    fn test_dedup_key() {
        assert_eq!(request("100").dedup_key(), "2:p1/4:app1/3:100");
    }

    #[test]
    fn test_dedup_key_does_not_collide_on_separators() {
        let mut left = request("c");
        left.project_id = ProjectId::from("a:b");
        left.app.remote_app_id = "x".to_string();
        let mut right = request("b:c");
        right.project_id = ProjectId::from("a");
        right.app.remote_app_id = "x".to_string();
        assert_ne!(left.dedup_key(), right.dedup_key());
    }

    #[test]
    fn test_request_payload_round_trips_through_json() {
        let json = serde_json::to_string(&request("100")).unwrap();
        let parsed: FetchBuildRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request("100"));
    }

    #[tokio::test]
    async fn test_fetch_registers_new_build() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_get_download_url()
            .withf(|app, platform, version, build| {
                app == "app1" && platform == "ios" && version == "1.0" && build == "100"
            })
            .times(1)
            .returning(|_, _, _, _| Ok("https://cdn/app1/100.zip".to_string()));
        let mut http = MockHttp::new();
        http.expect_download().times(1).returning(|_, _| Ok(macho_zip()));

        let h = harness(catalog, http).await;
        let app = seed_app(&h).await;

        let outcome = h.fetcher.fetch_build(&request("100")).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Registered { files: 1, .. }));
        assert!(h.bundles.exists(&app.id, "100").await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_skips_synced_build() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_get_download_url()
            .times(1)
            .returning(|_, _, _, _| Ok("https://cdn/x".to_string()));
        let mut http = MockHttp::new();
        http.expect_download().times(1).returning(|_, _| Ok(macho_zip()));

        let h = harness(catalog, http).await;
        seed_app(&h).await;

        h.fetcher.fetch_build(&request("100")).await.unwrap();
        let second = h.fetcher.fetch_build(&request("100")).await.unwrap();
        assert_eq!(second, FetchOutcome::AlreadySynced);
    }

    #[tokio::test]
    async fn test_missing_application_aborts() {
        let h = harness(MockCatalog::new(), MockHttp::new()).await;
        let result = h.fetcher.fetch_build(&request("100")).await;
        assert!(matches!(result, Err(SyncError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unknown_build_url_is_not_found() {
        let mut catalog = MockCatalog::new();
        catalog.expect_get_download_url().returning(|_, _, _, _| {
            Err(BridgeError::Status {
                status: 404,
                message: "no dSYM".into(),
            })
        });

        let h = harness(catalog, MockHttp::new()).await;
        seed_app(&h).await;

        let result = h.fetcher.fetch_build(&request("100")).await;
        assert!(matches!(result, Err(SyncError::NotFound { .. })));
    }
}
