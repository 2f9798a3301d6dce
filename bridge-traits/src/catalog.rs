//! Remote Build Catalog Abstraction
//!
//! A catalog is a remote build-distribution service that knows which
//! applications a team ships, which builds exist for each application, and
//! where the debug-symbol archive for a build can be downloaded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Credentials used to talk to a catalog on behalf of one project.
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogCredentials {
    /// Base URL of the catalog API
    pub api_base_url: String,
    /// Opaque API token sent as a bearer token
    pub api_token: String,
    /// Optional team/provider identifier for multi-team accounts
    pub team_id: Option<String>,
}

impl CatalogCredentials {
    pub fn new(api_base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            api_token: api_token.into(),
            team_id: None,
        }
    }

    pub fn with_team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }
}

impl fmt::Debug for CatalogCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogCredentials")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &"[REDACTED]")
            .field("team_id", &self.team_id)
            .finish()
    }
}

/// An application as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogApplication {
    /// Catalog-side application identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Bundle identifier (e.g. `com.example.app`)
    pub bundle_id: Option<String>,
    /// Primary platform reported by the catalog
    pub platform: Option<String>,
    /// Icon URL, if the catalog exposes one
    pub icon_url: Option<String>,
}

impl CatalogApplication {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bundle_id: None,
            platform: None,
            icon_url: None,
        }
    }
}

/// One versioned build of an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogBuild {
    pub build_id: String,
    pub version: String,
    pub platform: String,
}

impl CatalogBuild {
    pub fn new(
        build_id: impl Into<String>,
        version: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            build_id: build_id.into(),
            version: version.into(),
            platform: platform.into(),
        }
    }
}

/// Remote catalog client.
///
/// Errors are reported as [`BridgeError`](crate::error::BridgeError):
/// transport failures as `Timeout`/`OperationFailed`/`Status`, and rejected
/// credentials as `Status` 401/403.
///
/// # Example
///
/// ```ignore
/// for app in client.list_applications().await? {
///     for build in client.list_builds(&app.id).await? {
///         let url = client
///             .get_download_url(&app.id, &build.platform, &build.version, &build.build_id)
///             .await?;
///     }
/// }
/// ```
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// List every application visible to the configured account.
    async fn list_applications(&self) -> Result<Vec<CatalogApplication>>;

    /// List the builds of one application.
    async fn list_builds(&self, app_id: &str) -> Result<Vec<CatalogBuild>>;

    /// Resolve the download URL of a build's debug-symbol archive.
    async fn get_download_url(
        &self,
        app_id: &str,
        platform: &str,
        version: &str,
        build_id: &str,
    ) -> Result<String>;
}

/// Builds catalog clients from per-project credentials.
pub trait CatalogClientFactory: Send + Sync {
    /// Create a client bound to `credentials`.
    ///
    /// Returns `BridgeError::NotAvailable` when the credentials cannot be used.
    fn create(&self, credentials: &CatalogCredentials) -> Result<Arc<dyn CatalogClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_token() {
        let credentials = CatalogCredentials::new("https://api.example.com", "super-secret")
            .with_team_id("team-1");
        let debug = format!("{:?}", credentials);

        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("team-1"));
    }

    #[test]
    fn test_build_serde_shape() {
        let build = CatalogBuild::new("100", "1.0", "ios");
        let json = serde_json::to_value(&build).unwrap();

        assert_eq!(json["build_id"], "100");
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["platform"], "ios");
    }
}
