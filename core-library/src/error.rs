use bridge_traits::error::BridgeError;
use bridge_traits::store::RecordId;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    /// Transport or server failure reported by the store gateway.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] BridgeError),

    /// Caller input violated a precondition. Nothing was written.
    #[error("Invalid input: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Partial failure: {0}")]
    PartialFailure(PartialFailure),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// The store answered but refused a single-record mutation.
    #[error("Store rejected write to '{collection}': {message}")]
    Rejected { collection: String, message: String },

    #[error("Failed to decode '{collection}' record: {message}")]
    Decode { collection: String, message: String },
}

impl LibraryError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn rejected(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// True when a retry of the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::PartialFailure(_))
    }
}

/// A multi-step or multi-record operation that only partly completed.
///
/// `succeeded` and `failed` hold the ids addressed by the failing step: song
/// ids when rows were being created, row ids when rows were being deleted or
/// renumbered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub operation: String,
    pub step: String,
    pub succeeded: Vec<RecordId>,
    pub failed: Vec<RecordId>,
    pub message: String,
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed at '{}' ({} succeeded, {} failed): {}",
            self.operation,
            self.step,
            self.succeeded.len(),
            self.failed.len(),
            self.message
        )
    }
}

impl From<PartialFailure> for LibraryError {
    fn from(failure: PartialFailure) -> Self {
        Self::PartialFailure(failure)
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
