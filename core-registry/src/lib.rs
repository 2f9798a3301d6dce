//! # Symbol Registry
//!
//! SQLite persistence for catalog integrations, applications and
//! debug-symbol bundles.
//!
//! ## Overview
//!
//! - [`IntegrationRepository`] - which projects sync, and with which credentials
//! - [`ApplicationRepository`] - applications seen in a project's catalog
//! - [`BundleRepository`] - one immutable bundle per (application, build)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_registry::{create_pool, DatabaseConfig, SqliteBundleRepository};
//!
//! let pool = create_pool(DatabaseConfig::new("sync.db")).await?;
//! let bundles = SqliteBundleRepository::new(pool.clone());
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{RegistryError, Result};
pub use models::{
    Application, ApplicationId, BundleFile, BundleId, DebugSymbolBundle, IntegrationSettings,
    ProjectId, StoredSymbolFile, SymbolFileId,
};
pub use repositories::{
    ApplicationRepository, BundleRepository, IntegrationRepository, SqliteApplicationRepository,
    SqliteBundleRepository, SqliteIntegrationRepository,
};
