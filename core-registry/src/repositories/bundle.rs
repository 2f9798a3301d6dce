//! Debug symbol bundle repository
//!
//! A bundle row and its file rows are written in one transaction. The
//! `UNIQUE(application_id, build_id)` constraint decides which of two
//! concurrent registrations wins; the loser gets [`RegistryError::Conflict`]
//! and nothing it wrote is kept.

use crate::error::{RegistryError, Result};
use crate::models::{
    ApplicationId, BundleFile, BundleId, DebugSymbolBundle, ProjectId, StoredSymbolFile,
    SymbolFileId,
};
use crate::repositories::invalid_id;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::path::PathBuf;
use tracing::debug;

#[async_trait]
pub trait BundleRepository: Send + Sync {
    /// Whether a bundle is registered for `(application_id, build_id)`.
    async fn exists(&self, application_id: &ApplicationId, build_id: &str) -> Result<bool>;

    async fn find(
        &self,
        application_id: &ApplicationId,
        build_id: &str,
    ) -> Result<Option<DebugSymbolBundle>>;

    /// Atomically register a bundle together with its stored files.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a bundle already exists for the same application and build
    /// - `InvalidInput` if `files` is empty
    async fn register(
        &self,
        bundle: &DebugSymbolBundle,
        files: &[StoredSymbolFile],
    ) -> Result<DebugSymbolBundle>;

    async fn files_for(&self, bundle_id: &BundleId) -> Result<Vec<BundleFile>>;

    async fn count_for_application(&self, application_id: &ApplicationId) -> Result<u64>;
}

pub struct SqliteBundleRepository {
    pool: SqlitePool,
}

impl SqliteBundleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BundleRow {
    id: String,
    application_id: String,
    build_id: String,
    version: String,
    platform: String,
    file_count: i64,
    created_at: i64,
}

impl TryFrom<BundleRow> for DebugSymbolBundle {
    type Error = RegistryError;

    fn try_from(row: BundleRow) -> Result<Self> {
        Ok(DebugSymbolBundle {
            id: BundleId::from_string(&row.id).map_err(|e| invalid_id("debug_symbol_bundles.id", e))?,
            application_id: ApplicationId::from_string(&row.application_id)
                .map_err(|e| invalid_id("debug_symbol_bundles.application_id", e))?,
            build_id: row.build_id,
            version: row.version,
            platform: row.platform,
            file_count: u32::try_from(row.file_count).unwrap_or(u32::MAX),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BundleFileRow {
    id: String,
    bundle_id: String,
    project_id: String,
    name: String,
    sha256: String,
    size: i64,
    storage_path: String,
    created_at: i64,
}

impl TryFrom<BundleFileRow> for BundleFile {
    type Error = RegistryError;

    fn try_from(row: BundleFileRow) -> Result<Self> {
        Ok(BundleFile {
            file_id: SymbolFileId::from_string(&row.id)
                .map_err(|e| invalid_id("debug_symbol_bundle_files.id", e))?,
            bundle_id: BundleId::from_string(&row.bundle_id)
                .map_err(|e| invalid_id("debug_symbol_bundle_files.bundle_id", e))?,
            project_id: ProjectId::new(row.project_id),
            name: row.name,
            sha256: row.sha256,
            size: u64::try_from(row.size).unwrap_or_default(),
            path: PathBuf::from(row.storage_path),
            created_at: row.created_at,
        })
    }
}

fn size_as_i64(file: &StoredSymbolFile) -> Result<i64> {
    i64::try_from(file.size).map_err(|_| RegistryError::InvalidInput {
        field: "size".to_string(),
        message: format!("{} is too large to store", file.size),
    })
}

#[async_trait]
impl BundleRepository for SqliteBundleRepository {
    async fn exists(&self, application_id: &ApplicationId, build_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM debug_symbol_bundles WHERE application_id = ? AND build_id = ?",
        )
        .bind(application_id.as_string())
        .bind(build_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn find(
        &self,
        application_id: &ApplicationId,
        build_id: &str,
    ) -> Result<Option<DebugSymbolBundle>> {
        let row = sqlx::query_as::<_, BundleRow>(
            r#"
            SELECT id, application_id, build_id, version, platform, file_count, created_at
            FROM debug_symbol_bundles
            WHERE application_id = ? AND build_id = ?
            "#,
        )
        .bind(application_id.as_string())
        .bind(build_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DebugSymbolBundle::try_from).transpose()
    }

    async fn register(
        &self,
        bundle: &DebugSymbolBundle,
        files: &[StoredSymbolFile],
    ) -> Result<DebugSymbolBundle> {
        if files.is_empty() {
            return Err(RegistryError::InvalidInput {
                field: "files".to_string(),
                message: "a bundle needs at least one stored file".to_string(),
            });
        }

        let mut registered = bundle.clone();
        registered.file_count = u32::try_from(files.len()).unwrap_or(u32::MAX);

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO debug_symbol_bundles (
                id, application_id, build_id, version, platform, file_count, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(application_id, build_id) DO NOTHING
            "#,
        )
        .bind(registered.id.as_string())
        .bind(registered.application_id.as_string())
        .bind(&registered.build_id)
        .bind(&registered.version)
        .bind(&registered.platform)
        .bind(i64::from(registered.file_count))
        .bind(registered.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(
                application_id = %registered.application_id,
                build_id = %registered.build_id,
                "Bundle already registered"
            );
            return Err(RegistryError::Conflict {
                application_id: registered.application_id.to_string(),
                build_id: registered.build_id.clone(),
            });
        }

        for file in files {
            sqlx::query(
                r#"
                INSERT INTO debug_symbol_bundle_files (
                    id, bundle_id, project_id, name, sha256, size, storage_path, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file.id.as_string())
            .bind(registered.id.as_string())
            .bind(file.project_id.as_str())
            .bind(&file.name)
            .bind(&file.sha256)
            .bind(size_as_i64(file)?)
            .bind(file.path.to_string_lossy().into_owned())
            .bind(registered.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            bundle_id = %registered.id,
            build_id = %registered.build_id,
            files = registered.file_count,
            "Bundle registered"
        );
        Ok(registered)
    }

    async fn files_for(&self, bundle_id: &BundleId) -> Result<Vec<BundleFile>> {
        let rows = sqlx::query_as::<_, BundleFileRow>(
            r#"
            SELECT id, bundle_id, project_id, name, sha256, size, storage_path, created_at
            FROM debug_symbol_bundle_files
            WHERE bundle_id = ?
            ORDER BY name
            "#,
        )
        .bind(bundle_id.as_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(BundleFile::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn count_for_application(&self, application_id: &ApplicationId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM debug_symbol_bundles WHERE application_id = ?")
                .bind(application_id.as_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
