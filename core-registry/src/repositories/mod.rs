//! Repository traits and SQLite implementations.

pub mod application;
pub mod bundle;
pub mod integration;

pub use application::{ApplicationRepository, SqliteApplicationRepository};
pub use bundle::{BundleRepository, SqliteBundleRepository};
pub use integration::{IntegrationRepository, SqliteIntegrationRepository};

use crate::error::RegistryError;

/// Map a malformed stored UUID to an error naming the column.
pub(crate) fn invalid_id(field: &str, err: uuid::Error) -> RegistryError {
    RegistryError::InvalidInput {
        field: field.to_string(),
        message: format!("stored value is not a UUID: {}", err),
    }
}
