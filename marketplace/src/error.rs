//! Error taxonomy for marketplace operations.

use crate::store::DocumentStoreError;
use thiserror::Error;

/// Result alias for marketplace operations
pub type RentalResult<T> = Result<T, RentalError>;

/// Errors surfaced to callers of the marketplace services.
///
/// Validation and state errors are always raised before anything is
/// persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RentalError {
    /// Malformed input
    #[error("{0}")]
    Validation(String),

    /// The renter already holds a blocking booking for the item
    #[error("{0}")]
    Conflict(String),

    /// A status or flag precondition does not hold, including losing a
    /// conditional write race
    #[error("{0}")]
    State(String),

    /// The document store failed; safe to retry
    #[error("Storage unavailable: {0}")]
    TransientStore(String),

    /// A referenced document does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Document kind ("booking", "item", ...)
        kind: &'static str,
        /// Document id
        id: String,
    },
}

impl RentalError {
    /// Build a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build a conflict error
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Build a state error
    #[must_use]
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Build a not-found error
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether re-issuing the same call may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

impl From<DocumentStoreError> for RentalError {
    fn from(err: DocumentStoreError) -> Self {
        match err {
            DocumentStoreError::NotFound { collection, id } => Self::NotFound {
                kind: collection.singular(),
                id,
            },
            DocumentStoreError::RevisionMismatch { .. } => {
                Self::state("The booking was changed by someone else. Please refresh and try again.")
            },
            DocumentStoreError::Unavailable(message) | DocumentStoreError::Serialization(message) => {
                Self::TransientStore(message)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Collection;

    #[test]
    fn store_errors_map_onto_the_taxonomy() {
        let err: RentalError = DocumentStoreError::NotFound {
            collection: Collection::Bookings,
            id: "b-1".to_string(),
        }
        .into();
        assert_eq!(err, RentalError::not_found("booking", "b-1"));
        assert_eq!(err.to_string(), "booking not found: b-1");

        let err: RentalError = DocumentStoreError::Unavailable("timeout".to_string()).into();
        assert!(err.is_retryable());

        let err: RentalError = DocumentStoreError::RevisionMismatch {
            id: "b-1".to_string(),
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(matches!(err, RentalError::State(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn user_facing_messages_are_bare() {
        assert_eq!(
            RentalError::validation("Please select start and end dates").to_string(),
            "Please select start and end dates"
        );
    }
}
