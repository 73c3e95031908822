//! # DomainError
//!
//! Centralized error handling for formkeep.
//! Maps storage and validation failures to actionable error types.

use thiserror::Error;

use crate::models::FormId;

/// The primary error type for all domain and service operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (e.g., select field without options, min >= max)
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller is not allowed to act on the resource (e.g., not the form owner)
    #[error("permission denied: {0}")]
    Permission(String),

    /// Resource not found (e.g., Form, Snapshot, Response)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Persisted state contradicts an invariant, e.g. a past version without a snapshot.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// The form was edited by someone else between read and write.
    #[error("concurrent edit on form {form_id}: expected revision {expected}, found {found}")]
    ConcurrencyConflict {
        form_id: FormId,
        expected: u64,
        found: u64,
    },

    /// Infrastructure failure (e.g., DB down)
    #[error("storage error: {0}")]
    Storage(String),

    /// Encoding or decoding of a persisted payload failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Only a concurrency conflict may be retried, and only as a whole batch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A specialized Result type for formkeep logic.
pub type DomainResult<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        let conflict = DomainError::ConcurrencyConflict {
            form_id: FormId::new(),
            expected: 3,
            found: 4,
        };
        assert!(conflict.is_retryable());
        assert!(!DomainError::Consistency("gap".into()).is_retryable());
        assert!(!DomainError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = DomainError::not_found("snapshot", "v2");
        assert_eq!(err.to_string(), "snapshot not found: v2");
    }
}
