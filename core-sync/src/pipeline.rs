//! # Symbol Pipeline
//!
//! Download, spool, unpack, register: the part of a fetch task that runs
//! once the download URL is known.
//!
//! ## Overview
//!
//! The archive is downloaded with the pipeline's own timeout, written to a
//! temporary file in the spool directory and unpacked into symbol storage.
//! The temporary file is owned by a [`tempfile::NamedTempFile`] guard and is
//! removed on every exit path.
//!
//! Registration is the only step that touches the database. When another
//! worker registered the same build first, the freshly unpacked files are
//! discarded and the outcome is [`FetchOutcome::ConcurrentlyRegistered`].

use crate::error::{Result, SyncError};
use crate::fetch_task::FetchOutcome;
use crate::unpacker::ArchiveUnpacker;
use bridge_traits::catalog::CatalogBuild;
use bridge_traits::http::{FetchOptions, HttpClient};
use bytes::Bytes;
use core_registry::{Application, BundleRepository, DebugSymbolBundle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

pub struct SymbolPipeline {
    http: Arc<dyn HttpClient>,
    unpacker: Arc<dyn ArchiveUnpacker>,
    bundles: Arc<dyn BundleRepository>,
    spool_dir: PathBuf,
    fetch: FetchOptions,
}

impl SymbolPipeline {
    pub fn new(
        http: Arc<dyn HttpClient>,
        unpacker: Arc<dyn ArchiveUnpacker>,
        bundles: Arc<dyn BundleRepository>,
        spool_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http,
            unpacker,
            bundles,
            spool_dir: spool_dir.into(),
            fetch: FetchOptions::default(),
        }
    }

    /// Override the download options (the timeout in particular).
    pub fn with_fetch_options(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn fetch_options(&self) -> FetchOptions {
        self.fetch
    }

    /// Download the archive at `url` and register it as the bundle of `build`.
    #[instrument(
        skip(self, application, url),
        fields(
            project_id = %application.project_id,
            remote_app_id = %application.remote_app_id,
            build_id = %build.build_id
        )
    )]
    pub async fn download_and_register(
        &self,
        application: &Application,
        build: &CatalogBuild,
        url: &str,
    ) -> Result<FetchOutcome> {
        let body = self.http.download(url, self.fetch).await?;
        debug!(bytes = body.len(), "Archive downloaded");

        let spooled = self.spool(body).await?;
        let files = self
            .unpacker
            .unpack(spooled.path(), &application.project_id)
            .await?;
        drop(spooled);

        let bundle = DebugSymbolBundle::new(application.id, build);
        match self.bundles.register(&bundle, &files).await.map_err(SyncError::from) {
            Ok(registered) => {
                info!(
                    bundle_id = %registered.id,
                    file_count = registered.file_count,
                    "Debug symbols registered"
                );
                Ok(FetchOutcome::Registered {
                    bundle_id: registered.id,
                    files: files.len(),
                })
            }
            Err(SyncError::Conflict { .. }) => {
                info!("Build registered concurrently, discarding unpacked files");
                self.unpacker.discard(&files).await;
                Ok(FetchOutcome::ConcurrentlyRegistered)
            }
            Err(e) => {
                warn!(error = %e, "Failed to register debug symbols");
                self.unpacker.discard(&files).await;
                Err(e)
            }
        }
    }

    /// Write the archive to a temporary file that is deleted when dropped.
    async fn spool(&self, body: Bytes) -> Result<NamedTempFile> {
        let spool_dir = self.spool_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<NamedTempFile> {
            std::fs::create_dir_all(&spool_dir)?;
            let mut file = tempfile::Builder::new()
                .prefix("dsym-")
                .suffix(".archive")
                .tempfile_in(&spool_dir)?;
            file.write_all(&body)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{macho_zip, MockBundles, MockHttp};
    use crate::unpacker::DebugArchiveUnpacker;
    use bridge_traits::error::BridgeError;
    use core_registry::{
        create_test_pool, ApplicationRepository, ProjectId, RegistryError,
        SqliteApplicationRepository, SqliteBundleRepository,
    };
    use std::path::Path;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        spool: PathBuf,
        store: PathBuf,
        bundles: Arc<SqliteBundleRepository>,
        application: Application,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_test_pool().await.unwrap();
        let application = SqliteApplicationRepository::new(pool.clone())
            .upsert(&Application::new(ProjectId::from("p1"), "app1", "Example"))
            .await
            .unwrap();
        Fixture {
            spool: dir.path().join("spool"),
            store: dir.path().join("store"),
            _dir: dir,
            bundles: Arc::new(SqliteBundleRepository::new(pool)),
            application,
        }
    }

    fn pipeline(fx: &Fixture, http: MockHttp) -> SymbolPipeline {
        SymbolPipeline::new(
            Arc::new(http),
            Arc::new(DebugArchiveUnpacker::new(&fx.store)),
            fx.bundles.clone(),
            &fx.spool,
        )
    }

    fn spool_is_empty(spool: &Path) -> bool {
        std::fs::read_dir(spool).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn test_download_and_register() {
        let fx = fixture().await;
        let mut http = MockHttp::new();
        http.expect_download()
            .withf(|url, options| url == "https://cdn/app1/100.zip" && options.timeout == Duration::from_secs(120))
            .times(1)
            .returning(|_, _| Ok(macho_zip()));

        let build = CatalogBuild::new("100", "1.0", "ios");
        let outcome = pipeline(&fx, http)
            .download_and_register(&fx.application, &build, "https://cdn/app1/100.zip")
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::Registered { files: 1, .. }));
        assert!(fx.bundles.exists(&fx.application.id, "100").await.unwrap());
        assert!(spool_is_empty(&fx.spool));
    }

    #[tokio::test]
    async fn test_custom_timeout_is_passed_per_call() {
        let fx = fixture().await;
        let mut http = MockHttp::new();
        http.expect_download()
            .withf(|_, options| options.timeout == Duration::from_secs(5))
            .returning(|_, _| Ok(macho_zip()));

        let build = CatalogBuild::new("100", "1.0", "ios");
        let pipeline = pipeline(&fx, http).with_fetch_options(FetchOptions::with_timeout(Duration::from_secs(5)));
        assert!(pipeline
            .download_and_register(&fx.application, &build, "https://cdn/x")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_archive_registers_nothing_and_cleans_spool() {
        let fx = fixture().await;
        let mut http = MockHttp::new();
        http.expect_download()
            .returning(|_, _| Ok(Bytes::from_static(b"<html>oops</html>")));

        let build = CatalogBuild::new("100", "1.0", "ios");
        let result = pipeline(&fx, http)
            .download_and_register(&fx.application, &build, "https://cdn/x")
            .await;

        assert!(matches!(result, Err(SyncError::Format(_))));
        assert!(!fx.bundles.exists(&fx.application.id, "100").await.unwrap());
        assert!(spool_is_empty(&fx.spool));
    }

    #[tokio::test]
    async fn test_download_failure_is_transport_error() {
        let fx = fixture().await;
        let mut http = MockHttp::new();
        http.expect_download()
            .returning(|_, _| Err(BridgeError::Timeout("120s elapsed".into())));

        let build = CatalogBuild::new("100", "1.0", "ios");
        let result = pipeline(&fx, http)
            .download_and_register(&fx.application, &build, "https://cdn/x")
            .await;

        assert!(matches!(result, Err(SyncError::Transport(_))));
        assert!(spool_is_empty(&fx.spool));
    }

    #[tokio::test]
    async fn test_concurrent_registration_discards_files() {
        let fx = fixture().await;
        let build = CatalogBuild::new("100", "1.0", "ios");

        let mut first = MockHttp::new();
        first.expect_download().returning(|_, _| Ok(macho_zip()));
        pipeline(&fx, first)
            .download_and_register(&fx.application, &build, "https://cdn/x")
            .await
            .unwrap();

        let mut second = MockHttp::new();
        second.expect_download().returning(|_, _| Ok(macho_zip()));
        let outcome = pipeline(&fx, second)
            .download_and_register(&fx.application, &build, "https://cdn/x")
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::ConcurrentlyRegistered);
        assert_eq!(fx.bundles.count_for_application(&fx.application.id).await.unwrap(), 1);
        let stored = std::fs::read_dir(fx.store.join("p1")).unwrap().count();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_registry_failure_propagates_and_discards_files() {
        let fx = fixture().await;
        let mut http = MockHttp::new();
        http.expect_download().returning(|_, _| Ok(macho_zip()));
        let mut bundles = MockBundles::new();
        bundles
            .expect_register()
            .withf(|_, files| files.len() == 1 && files.iter().all(|f| f.path.exists()))
            .times(1)
            .returning(|_, _| Err(RegistryError::Database(sqlx::Error::PoolTimedOut)));

        let pipeline = SymbolPipeline::new(
            Arc::new(http),
            Arc::new(DebugArchiveUnpacker::new(&fx.store)),
            Arc::new(bundles),
            &fx.spool,
        );
        let build = CatalogBuild::new("100", "1.0", "ios");
        let result = pipeline
            .download_and_register(&fx.application, &build, "https://cdn/x")
            .await;

        assert!(matches!(result, Err(SyncError::Database(_))));
        assert!(spool_is_empty(&fx.spool));
        let stored = std::fs::read_dir(fx.store.join("p1")).unwrap().count();
        assert_eq!(stored, 0);
    }
}
