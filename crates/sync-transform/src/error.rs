//! Transformation error types.

use thiserror::Error;

/// Errors raised while building documents or mappings.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Field value variant does not match the declared field type
    #[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: &'static str,
    },

    /// Number has no 64-bit float representation
    #[error("Invalid number for field '{0}'")]
    InvalidNumber(String),

    /// Entity needs a schema but carries none
    #[error("Entity {0} has no schema reference")]
    MissingSchema(String),

    /// Entity references a different schema version than the one supplied
    #[error("Entity {uuid} uses schema {actual}, document requested for {expected}")]
    SchemaMismatch {
        uuid: String,
        expected: String,
        actual: String,
    },

    /// JSON encoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TransformError {
    fn from(err: serde_json::Error) -> Self {
        TransformError::Serialization(err.to_string())
    }
}
