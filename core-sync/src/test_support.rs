//! Mocks and fixtures shared by the unit tests.

use async_trait::async_trait;
use bridge_traits::catalog::{
    CatalogApplication, CatalogBuild, CatalogClient, CatalogClientFactory, CatalogCredentials,
};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{FetchOptions, HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_registry::{
    ApplicationId, BundleFile, BundleId, BundleRepository, DebugSymbolBundle,
    Result as RegistryResult, StoredSymbolFile,
};
use mockall::mock;
use std::io::Write;
use std::sync::Arc;

mock! {
    pub Catalog {}

    #[async_trait]
    impl CatalogClient for Catalog {
        async fn list_applications(&self) -> BridgeResult<Vec<CatalogApplication>>;
        async fn list_builds(&self, app_id: &str) -> BridgeResult<Vec<CatalogBuild>>;
        async fn get_download_url(
            &self,
            app_id: &str,
            platform: &str,
            version: &str,
            build_id: &str,
        ) -> BridgeResult<String>;
    }
}

mock! {
    pub Factory {}

    impl CatalogClientFactory for Factory {
        fn create(&self, credentials: &CatalogCredentials) -> BridgeResult<Arc<dyn CatalogClient>>;
    }
}

mock! {
    pub Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download(&self, url: &str, options: FetchOptions) -> BridgeResult<Bytes>;
    }
}

mock! {
    pub Bundles {}

    #[async_trait]
    impl BundleRepository for Bundles {
        async fn exists(&self, application_id: &ApplicationId, build_id: &str) -> RegistryResult<bool>;
        async fn find(
            &self,
            application_id: &ApplicationId,
            build_id: &str,
        ) -> RegistryResult<Option<DebugSymbolBundle>>;
        async fn register(
            &self,
            bundle: &DebugSymbolBundle,
            files: &[StoredSymbolFile],
        ) -> RegistryResult<DebugSymbolBundle>;
        async fn files_for(&self, bundle_id: &BundleId) -> RegistryResult<Vec<BundleFile>>;
        async fn count_for_application(&self, application_id: &ApplicationId) -> RegistryResult<u64>;
    }
}

/// A factory handing out the same client for every project.
pub fn factory_for(client: Arc<dyn CatalogClient>) -> MockFactory {
    let mut factory = MockFactory::new();
    factory
        .expect_create()
        .returning(move |_| Ok(client.clone()));
    factory
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
        writer.write_all(&[0xcf, 0xfa, 0xed, 0xfe, 1, 2, 3]).unwrap();
        writer.finish().unwrap();
    }
    Bytes::from(cursor.into_inner())
}
