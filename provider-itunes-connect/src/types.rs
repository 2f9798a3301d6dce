//! iTunes Connect API response types

use bridge_traits::catalog::{CatalogApplication, CatalogBuild};
use serde::{Deserialize, Serialize};

/// Application resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppResource {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl From<AppResource> for CatalogApplication {
    fn from(app: AppResource) -> Self {
        Self {
            id: app.id,
            name: app.name,
            bundle_id: app.bundle_id,
            platform: app.platform,
            icon_url: app.icon_url,
        }
    }
}

/// Build resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResource {
    /// Build number, e.g. `"100"`
    pub build_id: String,
    /// Marketing version, e.g. `"1.2.0"`
    pub version: String,
    pub platform: String,
}

impl From<BuildResource> for CatalogBuild {
    fn from(build: BuildResource) -> Self {
        CatalogBuild::new(build.build_id, build.version, build.platform)
    }
}

/// `GET /apps` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppsListResponse {
    #[serde(default)]
    pub apps: Vec<AppResource>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// `GET /apps/{id}/builds` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildsListResponse {
    #[serde(default)]
    pub builds: Vec<BuildResource>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// dSYM location response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsymUrlResponse {
    /// Absent when the build has no debug symbols
    #[serde(default)]
    pub url: Option<String>,
}
