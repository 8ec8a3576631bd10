//! Error types shared by the search-sync crates.

use thiserror::Error;

/// Errors raised while loading configuration or decoding domain types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown field type tag in a schema definition
    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    /// List field whose element type cannot be indexed
    #[error("Unsupported list element type '{element}' for field '{field}'")]
    UnsupportedListType { field: String, element: String },

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::UnknownFieldType("geo".to_string());
        assert_eq!(err.to_string(), "Unknown field type: geo");

        let err = TypesError::UnsupportedListType {
            field: "images".to_string(),
            element: "binary".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported list element type 'binary' for field 'images'"
        );
    }
}
