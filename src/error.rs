// 🚨 Error Types - one error enum for the whole queue engine
//
// Only ValidationError ever reaches the caller of submit-vitals.
// External authority failures are absorbed by the reconciler's fallback path.

use std::fmt;

/// Result type alias
pub type Result<T> = std::result::Result<T, TriageError>;

// ============================================================================
// FIELD VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// CRATE ERROR
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    /// Malformed or out-of-range vitals/demographics (all failing fields)
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// External authority answered with a non-success status or unusable body
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Transport failure talking to the external authority (timeout, refused, DNS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Pop against an empty queue
    #[error("Queue is empty")]
    EmptyQueue,

    /// Bad environment configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl TriageError {
    /// True for failures of the external authority (timeout, status, network)
    pub fn is_external(&self) -> bool {
        matches!(self, TriageError::ExternalService(_) | TriageError::Http(_))
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = TriageError::Validation(vec![
            ValidationError::new("heart_rate", "must be > 0"),
            ValidationError::new("age", "is required"),
        ]);

        let msg = err.to_string();
        assert!(msg.contains("heart_rate: must be > 0"));
        assert!(msg.contains("age: is required"));
        assert!(!err.is_external());
    }

    #[test]
    fn test_external_classification() {
        assert!(TriageError::ExternalService("503".into()).is_external());
        assert!(!TriageError::EmptyQueue.is_external());
        assert!(!TriageError::Config("PORT".into()).is_external());
    }
}
