//! Application repository

use crate::error::{RegistryError, Result};
use crate::models::{Application, ApplicationId, ProjectId};
use crate::repositories::invalid_id;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

/// Access to applications observed in project catalogs.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Create the application or refresh its catalog fields.
    ///
    /// Keyed on `(project_id, remote_app_id)`. An existing row keeps its id
    /// and `created_at`; the stored record is returned either way.
    async fn upsert(&self, application: &Application) -> Result<Application>;

    async fn find_by_remote_id(
        &self,
        project_id: &ProjectId,
        remote_app_id: &str,
    ) -> Result<Option<Application>>;

    async fn list_for_project(&self, project_id: &ProjectId) -> Result<Vec<Application>>;
}

pub struct SqliteApplicationRepository {
    pool: SqlitePool,
}

impl SqliteApplicationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: String,
    project_id: String,
    remote_app_id: String,
    name: String,
    bundle_id: String,
    platform: Option<String>,
    icon_url: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = RegistryError;

    fn try_from(row: ApplicationRow) -> Result<Self> {
        Ok(Application {
            id: ApplicationId::from_string(&row.id).map_err(|e| invalid_id("applications.id", e))?,
            project_id: ProjectId::new(row.project_id),
            remote_app_id: row.remote_app_id,
            name: row.name,
            bundle_id: row.bundle_id,
            platform: row.platform,
            icon_url: row.icon_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ApplicationRepository for SqliteApplicationRepository {
    async fn upsert(&self, application: &Application) -> Result<Application> {
        application
            .validate()
            .map_err(|message| RegistryError::InvalidInput {
                field: "Application".to_string(),
                message,
            })?;

        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            INSERT INTO applications (
                id, project_id, remote_app_id, name, bundle_id, platform, icon_url,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id, remote_app_id) DO UPDATE SET
                name = excluded.name,
                bundle_id = excluded.bundle_id,
                platform = excluded.platform,
                icon_url = excluded.icon_url,
                updated_at = excluded.updated_at
            RETURNING id, project_id, remote_app_id, name, bundle_id, platform, icon_url,
                      created_at, updated_at
            "#,
        )
        .bind(application.id.as_string())
        .bind(application.project_id.as_str())
        .bind(&application.remote_app_id)
        .bind(&application.name)
        .bind(&application.bundle_id)
        .bind(&application.platform)
        .bind(&application.icon_url)
        .bind(application.created_at)
        .bind(application.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Application::try_from(row)
    }

    async fn find_by_remote_id(
        &self,
        project_id: &ProjectId,
        remote_app_id: &str,
    ) -> Result<Option<Application>> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, project_id, remote_app_id, name, bundle_id, platform, icon_url,
                   created_at, updated_at
            FROM applications
            WHERE project_id = ? AND remote_app_id = ?
            "#,
        )
        .bind(project_id.as_str())
        .bind(remote_app_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Application::try_from).transpose()
    }

    async fn list_for_project(&self, project_id: &ProjectId) -> Result<Vec<Application>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, project_id, remote_app_id, name, bundle_id, platform, icon_url,
                   created_at, updated_at
            FROM applications
            WHERE project_id = ?
            ORDER BY name, remote_app_id
            "#,
        )
        .bind(project_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(Application::try_from)
            .collect::<Result<Vec<_>>>()
    }
}
