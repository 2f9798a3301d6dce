//! Catalog integration settings repository

use crate::error::{RegistryError, Result};
use crate::models::{IntegrationSettings, ProjectId};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

/// Access to per-project catalog integration settings.
#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    /// All integrations marked enabled, ordered by project id.
    ///
    /// Enabled rows that lack credentials are included; callers decide how
    /// to report them.
    async fn list_enabled(&self) -> Result<Vec<IntegrationSettings>>;

    async fn find(&self, project_id: &ProjectId) -> Result<Option<IntegrationSettings>>;

    /// Insert or replace the settings of a project.
    async fn upsert(&self, settings: &IntegrationSettings) -> Result<()>;

    /// Toggle an integration.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the project has no integration row.
    async fn set_enabled(&self, project_id: &ProjectId, enabled: bool) -> Result<()>;
}

pub struct SqliteIntegrationRepository {
    pool: SqlitePool,
}

impl SqliteIntegrationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct IntegrationRow {
    project_id: String,
    enabled: bool,
    api_base_url: String,
    api_token: String,
    team_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<IntegrationRow> for IntegrationSettings {
    fn from(row: IntegrationRow) -> Self {
        Self {
            project_id: ProjectId::new(row.project_id),
            enabled: row.enabled,
            api_base_url: row.api_base_url,
            api_token: row.api_token,
            team_id: row.team_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl IntegrationRepository for SqliteIntegrationRepository {
    async fn list_enabled(&self) -> Result<Vec<IntegrationSettings>> {
        let rows = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT project_id, enabled, api_base_url, api_token, team_id, created_at, updated_at
            FROM catalog_integrations
            WHERE enabled = 1
            ORDER BY project_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(IntegrationSettings::from).collect())
    }

    async fn find(&self, project_id: &ProjectId) -> Result<Option<IntegrationSettings>> {
        let row = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT project_id, enabled, api_base_url, api_token, team_id, created_at, updated_at
            FROM catalog_integrations
            WHERE project_id = ?
            "#,
        )
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(IntegrationSettings::from))
    }

    async fn upsert(&self, settings: &IntegrationSettings) -> Result<()> {
        if settings.project_id.as_str().trim().is_empty() {
            return Err(RegistryError::InvalidInput {
                field: "project_id".to_string(),
                message: "project id cannot be empty".to_string(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO catalog_integrations (
                project_id, enabled, api_base_url, api_token, team_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id) DO UPDATE SET
                enabled = excluded.enabled,
                api_base_url = excluded.api_base_url,
                api_token = excluded.api_token,
                team_id = excluded.team_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.project_id.as_str())
        .bind(settings.enabled)
        .bind(&settings.api_base_url)
        .bind(&settings.api_token)
        .bind(&settings.team_id)
        .bind(settings.created_at)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_enabled(&self, project_id: &ProjectId, enabled: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE catalog_integrations SET enabled = ?, updated_at = ? WHERE project_id = ?",
        )
        .bind(enabled)
        .bind(chrono::Utc::now().timestamp())
        .bind(project_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound {
                entity_type: "IntegrationSettings".to_string(),
                id: project_id.to_string(),
            });
        }

        Ok(())
    }
}
