use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A bundle for this (application, build) was registered by someone else.
    #[error("Bundle already registered for application {application_id} build {build_id}")]
    Conflict {
        application_id: String,
        build_id: String,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
