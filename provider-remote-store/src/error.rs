//! Error types for the remote store provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Remote store provider errors
#[derive(Error, Debug)]
pub enum RemoteStoreError {
    /// The endpoint answered with a non-success HTTP status
    #[error("Record store API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The store processed the request and reported `success: false`
    #[error("Record store rejected request on '{collection}': {message}")]
    Rejected { collection: String, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for remote store operations
pub type Result<T> = std::result::Result<T, RemoteStoreError>;

impl From<RemoteStoreError> for BridgeError {
    fn from(error: RemoteStoreError) -> Self {
        match error {
            RemoteStoreError::ApiError {
                status_code,
                message,
            } => BridgeError::OperationFailed(format!(
                "API error (status {}): {}",
                status_code, message
            )),
            RemoteStoreError::Rejected {
                collection,
                message,
            } => BridgeError::StoreRejected {
                collection,
                message,
            },
            RemoteStoreError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            RemoteStoreError::BridgeError(e) => e,
        }
    }
}
