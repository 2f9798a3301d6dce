//! Error types for the iTunes Connect provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// iTunes Connect provider errors
#[derive(Error, Debug)]
pub enum ItunesConnectError {
    /// Token rejected or lacking access to the team
    #[error("Authentication failed (status {status_code}): {message}")]
    AuthenticationFailed { status_code: u16, message: String },

    /// API request returned an error
    #[error("iTunes Connect API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Application, build or dSYM does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Credentials cannot be used to build a client
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for iTunes Connect operations
pub type Result<T> = std::result::Result<T, ItunesConnectError>;

impl ItunesConnectError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status_code: u16, message: String, resource: &str) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationFailed {
                status_code,
                message,
            },
            404 => Self::NotFound {
                resource: resource.to_string(),
            },
            _ => Self::ApiError {
                status_code,
                message,
            },
        }
    }
}

impl From<ItunesConnectError> for BridgeError {
    fn from(error: ItunesConnectError) -> Self {
        match error {
            ItunesConnectError::AuthenticationFailed {
                status_code,
                message,
            } => BridgeError::Status {
                status: status_code,
                message: format!("Authentication failed: {}", message),
            },
            ItunesConnectError::ApiError {
                status_code,
                message,
            } => BridgeError::Status {
                status: status_code,
                message,
            },
            ItunesConnectError::NotFound { resource } => BridgeError::Status {
                status: 404,
                message: resource,
            },
            ItunesConnectError::ParseError(msg) => BridgeError::InvalidResponse(msg),
            ItunesConnectError::InvalidConfiguration(msg) => BridgeError::NotAvailable(msg),
            ItunesConnectError::BridgeError(e) => e,
        }
    }
}
