use bridge_traits::error::BridgeError;
use core_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Integration missing, disabled, or rejected by the catalog.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network, timeout or HTTP status failure talking to the catalog or CDN.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The downloaded archive could not be turned into symbol files.
    #[error("Archive format error: {0}")]
    Format(String),

    #[error("Bundle already registered for application {application_id} build {build_id}")]
    Conflict {
        application_id: String,
        build_id: String,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    /// A queued task whose payload or bookkeeping is unusable.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),
}

impl SyncError {
    /// Whether another attempt could succeed without outside intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Database(_) | Self::Io(_) | Self::Timeout(_)
        )
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Status { status: 404, message } => Self::NotFound {
                entity_type: "Remote resource".to_string(),
                id: message,
            },
            BridgeError::Status {
                status: status @ (401 | 403),
                message,
            } => Self::Configuration(format!(
                "catalog rejected credentials (HTTP {}): {}",
                status, message
            )),
            BridgeError::NotAvailable(message) => Self::Configuration(message),
            BridgeError::Io(e) => Self::Io(e),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<RegistryError> for SyncError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Conflict {
                application_id,
                build_id,
            } => Self::Conflict {
                application_id,
                build_id,
            },
            RegistryError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            RegistryError::InvalidInput { field, message } => {
                Self::InvalidTask(format!("{}: {}", field, message))
            }
            RegistryError::Database(e) => Self::Database(e.to_string()),
            RegistryError::Migration(message) => Self::Database(message),
        }
    }
}

impl From<core_runtime::Error> for SyncError {
    fn from(err: core_runtime::Error) -> Self {
        match err {
            core_runtime::Error::Io(e) => Self::Io(e),
            other => Self::Configuration(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidTask(format!("payload: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
