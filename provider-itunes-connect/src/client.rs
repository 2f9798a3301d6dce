//! iTunes Connect catalog client
//!
//! Implements the `CatalogClient` trait over the catalog's JSON API.

use async_trait::async_trait;
use bridge_traits::catalog::{
    CatalogApplication, CatalogBuild, CatalogClient, CatalogClientFactory, CatalogCredentials,
};
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::ItunesConnectError;
use crate::types::{AppsListResponse, BuildsListResponse, DsymUrlResponse};

/// Timeout of catalog API calls; archive downloads carry their own
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Guard against a server that keeps returning the same page token
const MAX_PAGES: usize = 100;

/// Header scoping requests to one team of a multi-team account
const TEAM_HEADER: &str = "X-Team-Id";

/// iTunes Connect API client bound to one account.
///
/// # Example
///
/// ```ignore
/// use provider_itunes_connect::ItunesConnectClient;
/// use bridge_traits::catalog::{CatalogClient, CatalogCredentials};
///
/// let client = ItunesConnectClient::new(http_client, &credentials)?;
/// let apps = client.list_applications().await?;
/// ```
pub struct ItunesConnectClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    api_token: String,
    team_id: Option<String>,
}

impl ItunesConnectClient {
    /// Create a client for `credentials`.
    ///
    /// Fails with `InvalidConfiguration` when the base URL is not an
    /// http(s) URL or the token is empty.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        credentials: &CatalogCredentials,
    ) -> crate::Result<Self> {
        let base_url = credentials.api_base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ItunesConnectError::InvalidConfiguration(format!(
                "API base URL must be an http(s) URL, got {:?}",
                base_url
            )));
        }
        if credentials.api_token.trim().is_empty() {
            return Err(ItunesConnectError::InvalidConfiguration(
                "API token is empty".to_string(),
            ));
        }

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
            api_token: credentials.api_token.clone(),
            team_id: credentials.team_id.clone(),
        })
    }

    fn request(&self, url: String) -> HttpRequest {
        let request = HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(&self.api_token)
            .header("Accept", "application/json")
            .timeout(API_TIMEOUT);

        match &self.team_id {
            Some(team_id) => request.header(TEAM_HEADER, team_id),
            None => request,
        }
    }

    /// GET `url` and decode the JSON body.
    ///
    /// Transient failures are retried by the HTTP client; any other
    /// non-success status is classified into an [`ItunesConnectError`].
    #[instrument(skip(self), fields(url = %url))]
    async fn get_json<T: DeserializeOwned>(&self, url: String, resource: &str) -> Result<T> {
        let response: HttpResponse = self
            .http_client
            .execute_with_retry(self.request(url), RetryPolicy::default())
            .await?;

        if !response.is_success() {
            let message = String::from_utf8_lossy(&response.body)
                .chars()
                .take(256)
                .collect::<String>();
            warn!(status = response.status, resource, "Catalog request failed");
            return Err(ItunesConnectError::from_status(response.status, message, resource).into());
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            ItunesConnectError::ParseError(format!("Failed to parse {} response: {}", resource, e))
                .into()
        })
    }

    fn with_page_token(url: String, page_token: Option<&str>) -> String {
        match page_token {
            Some(token) => format!("{}?pageToken={}", url, urlencoding::encode(token)),
            None => url,
        }
    }
}

#[async_trait]
impl CatalogClient for ItunesConnectClient {
    #[instrument(skip(self))]
    async fn list_applications(&self) -> Result<Vec<CatalogApplication>> {
        let mut apps = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let url = Self::with_page_token(format!("{}/apps", self.base_url), page_token.as_deref());
            let page: AppsListResponse = self.get_json(url, "apps").await?;
            apps.extend(page.apps.into_iter().map(CatalogApplication::from));

            match page.next_page_token {
                Some(next) if Some(&next) != page_token.as_ref() => page_token = Some(next),
                _ => {
                    info!(count = apps.len(), "Listed catalog applications");
                    return Ok(apps);
                }
            }
        }

        warn!(pages = MAX_PAGES, "Application listing truncated");
        Ok(apps)
    }

    #[instrument(skip(self), fields(app_id = %app_id))]
    async fn list_builds(&self, app_id: &str) -> Result<Vec<CatalogBuild>> {
        let mut builds = Vec::new();
        let mut page_token: Option<String> = None;
        let resource = format!("builds of app {}", app_id);

        for _ in 0..MAX_PAGES {
            let url = Self::with_page_token(
                format!("{}/apps/{}/builds", self.base_url, urlencoding::encode(app_id)),
                page_token.as_deref(),
            );
            let page: BuildsListResponse = self.get_json(url, &resource).await?;
            builds.extend(page.builds.into_iter().map(CatalogBuild::from));

            match page.next_page_token {
                Some(next) if Some(&next) != page_token.as_ref() => page_token = Some(next),
                _ => {
                    debug!(count = builds.len(), "Listed builds");
                    return Ok(builds);
                }
            }
        }

        warn!(pages = MAX_PAGES, "Build listing truncated");
        Ok(builds)
    }

    #[instrument(skip(self), fields(app_id = %app_id, build_id = %build_id))]
    async fn get_download_url(
        &self,
        app_id: &str,
        platform: &str,
        version: &str,
        build_id: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/apps/{}/platforms/{}/versions/{}/builds/{}/dsym",
            self.base_url,
            urlencoding::encode(app_id),
            urlencoding::encode(platform),
            urlencoding::encode(version),
            urlencoding::encode(build_id)
        );
        let resource = format!("dSYM of build {} of app {}", build_id, app_id);

        let response: DsymUrlResponse = self.get_json(url, &resource).await?;
        response
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ItunesConnectError::NotFound { resource }.into())
    }
}

/// Builds [`ItunesConnectClient`]s sharing one HTTP client.
pub struct ItunesConnectClientFactory {
    http_client: Arc<dyn HttpClient>,
}

impl ItunesConnectClientFactory {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl CatalogClientFactory for ItunesConnectClientFactory {
    fn create(&self, credentials: &CatalogCredentials) -> Result<Arc<dyn CatalogClient>> {
        let client = ItunesConnectClient::new(self.http_client.clone(), credentials)?;
        Ok(Arc::new(client))
    }
}
