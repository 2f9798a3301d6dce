//! Per-project catalog client resolution.

use crate::error::{Result, SyncError};
use bridge_traits::catalog::{CatalogClient, CatalogClientFactory};
use core_registry::{IntegrationRepository, IntegrationSettings, ProjectId};
use std::sync::Arc;
use tracing::debug;

/// Turns a project's stored integration settings into a catalog client.
///
/// Every way a project can be unusable (no settings, disabled, missing
/// endpoint or token, credentials refused by the factory) is reported as
/// [`SyncError::Configuration`].
pub struct CatalogClientResolver {
    integrations: Arc<dyn IntegrationRepository>,
    factory: Arc<dyn CatalogClientFactory>,
}

impl CatalogClientResolver {
    pub fn new(
        integrations: Arc<dyn IntegrationRepository>,
        factory: Arc<dyn CatalogClientFactory>,
    ) -> Self {
        Self {
            integrations,
            factory,
        }
    }

    pub async fn resolve(&self, project_id: &ProjectId) -> Result<Arc<dyn CatalogClient>> {
        let settings = self
            .integrations
            .find(project_id)
            .await?
            .ok_or_else(|| {
                SyncError::Configuration(format!("project {} has no catalog integration", project_id))
            })?;

        self.client_for(&settings)
    }

    /// Build a client from settings the caller already loaded.
    pub fn client_for(&self, settings: &IntegrationSettings) -> Result<Arc<dyn CatalogClient>> {
        let project_id = &settings.project_id;
        if !settings.enabled {
            return Err(SyncError::Configuration(format!(
                "catalog integration of project {} is disabled",
                project_id
            )));
        }

        let credentials = settings.credentials().ok_or_else(|| {
            SyncError::Configuration(format!(
                "catalog integration of project {} is missing its endpoint or token",
                project_id
            ))
        })?;

        debug!(project_id = %project_id, "Creating catalog client");
        self.factory
            .create(&credentials)
            .map_err(|e| SyncError::Configuration(e.to_string()))
    }
}
