//! Shared fixtures for the sync integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::catalog::{
    CatalogApplication, CatalogBuild, CatalogClient, CatalogClientFactory, CatalogCredentials,
};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{FetchOptions, HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_registry::{
    create_test_pool, IntegrationRepository, IntegrationSettings, ProjectId,
    SqliteApplicationRepository, SqliteBundleRepository, SqliteIntegrationRepository,
};
use core_sync::{
    BuildFetcher, BuildTaskWorker, CatalogClientResolver, DebugArchiveUnpacker, SymbolPipeline,
    SyncOrchestrator, TaskQueue,
};
use mockall::mock;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download(&self, url: &str, options: FetchOptions) -> BridgeResult<Bytes>;
    }
}

/// An in-memory catalog.
#[derive(Default)]
pub struct FakeCatalog {
    apps: Vec<(CatalogApplication, Vec<CatalogBuild>)>,
    listing_status: Option<u16>,
    listing_delay: Duration,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, id: &str, name: &str, build_ids: &[&str]) -> Self {
        let builds = build_ids
            .iter()
            .map(|b| CatalogBuild::new(*b, "1.0", "ios"))
            .collect();
        self.apps.push((CatalogApplication::new(id, name), builds));
        self
    }

    /// Answer application listings with this HTTP status.
    pub fn failing_with(mut self, status: u16) -> Self {
        self.listing_status = Some(status);
        self
    }

    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn list_applications(&self) -> BridgeResult<Vec<CatalogApplication>> {
        tokio::time::sleep(self.listing_delay).await;
        if let Some(status) = self.listing_status {
            return Err(BridgeError::Status {
                status,
                message: "catalog unavailable".to_string(),
            });
        }
        Ok(self.apps.iter().map(|(app, _)| app.clone()).collect())
    }

    async fn list_builds(&self, app_id: &str) -> BridgeResult<Vec<CatalogBuild>> {
        self.apps
            .iter()
            .find(|(app, _)| app.id == app_id)
            .map(|(_, builds)| builds.clone())
            .ok_or_else(|| BridgeError::Status {
                status: 404,
                message: app_id.to_string(),
            })
    }

    async fn get_download_url(
        &self,
        app_id: &str,
        platform: &str,
        version: &str,
        build_id: &str,
    ) -> BridgeResult<String> {
        Ok(format!(
            "https://cdn.example.com/{}/{}/{}/{}.zip",
            app_id, platform, version, build_id
        ))
    }
}

/// Hands out catalogs keyed by API token.
#[derive(Default)]
pub struct FakeFactory {
    catalogs: HashMap<String, Arc<FakeCatalog>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut self, token: &str, catalog: FakeCatalog) -> Self {
        self.catalogs.insert(token.to_string(), Arc::new(catalog));
        self
    }
}

impl CatalogClientFactory for FakeFactory {
    fn create(&self, credentials: &CatalogCredentials) -> BridgeResult<Arc<dyn CatalogClient>> {
        self.catalogs
            .get(&credentials.api_token)
            .map(|c| c.clone() as Arc<dyn CatalogClient>)
            .ok_or_else(|| BridgeError::NotAvailable("unknown token".to_string()))
    }
}

/// A zip archive holding one 64-bit Mach-O file.
pub fn macho_zip() -> Bytes {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file(
                "App.dSYM/Contents/Resources/DWARF/App",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer
            .write_all(&[0xcf, 0xfa, 0xed, 0xfe, 0x07, 0x00, 0x00, 0x01])
            .unwrap();
        writer.finish().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

/// The whole sync stack over an in-memory database and a temp directory.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub integrations: Arc<SqliteIntegrationRepository>,
    pub applications: Arc<SqliteApplicationRepository>,
    pub bundles: Arc<SqliteBundleRepository>,
    pub queue: Arc<TaskQueue>,
    pub fetcher: Arc<BuildFetcher>,
    pub orchestrator: SyncOrchestrator,
    pub worker: BuildTaskWorker,
}

impl Harness {
    pub async fn new(factory: FakeFactory, http: Arc<dyn HttpClient>) -> Self {
        Self::with_task_time_limit(factory, http, Duration::from_secs(300)).await
    }

    pub async fn with_task_time_limit(
        factory: FakeFactory,
        http: Arc<dyn HttpClient>,
        task_time_limit: Duration,
    ) -> Self {
        Self::with_worker(factory, http, task_time_limit, 4).await
    }

    pub async fn with_worker(
        factory: FakeFactory,
        http: Arc<dyn HttpClient>,
        task_time_limit: Duration,
        concurrency: usize,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_test_pool().await.unwrap();

        let integrations = Arc::new(SqliteIntegrationRepository::new(pool.clone()));
        let applications = Arc::new(SqliteApplicationRepository::new(pool.clone()));
        let bundles = Arc::new(SqliteBundleRepository::new(pool.clone()));
        let queue = Arc::new(TaskQueue::new(pool, 3).await.unwrap());

        let resolver = Arc::new(CatalogClientResolver::new(
            integrations.clone(),
            Arc::new(factory),
        ));
        let pipeline = Arc::new(SymbolPipeline::new(
            http,
            Arc::new(DebugArchiveUnpacker::new(dir.path().join("store"))),
            bundles.clone(),
            dir.path().join("spool"),
        ));
        let fetcher = Arc::new(BuildFetcher::new(
            applications.clone(),
            bundles.clone(),
            resolver.clone(),
            pipeline,
        ));
        let orchestrator = SyncOrchestrator::new(
            integrations.clone(),
            applications.clone(),
            bundles.clone(),
            resolver,
            queue.clone(),
        );
        let worker = BuildTaskWorker::new(queue.clone(), fetcher.clone(), concurrency)
            .with_task_time_limit(task_time_limit);

        Self {
            dir,
            integrations,
            applications,
            bundles,
            queue,
            fetcher,
            orchestrator,
            worker,
        }
    }

    pub async fn add_project(&self, project_id: &str, token: &str) {
        self.integrations
            .upsert(&IntegrationSettings::new(
                ProjectId::from(project_id),
                "https://api.example.com",
                token,
            ))
            .await
            .unwrap();
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.dir.path().join("spool")
    }

    pub fn store_dir(&self, project_id: &str) -> PathBuf {
        self.dir.path().join("store").join(project_id)
    }

    pub fn spool_is_empty(&self) -> bool {
        std::fs::read_dir(self.spool_dir())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}
