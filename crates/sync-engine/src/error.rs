//! Search engine error types.

use thiserror::Error;

/// Errors that can occur while talking to a search engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection, DNS or request timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Engine answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Engine response did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Index schema on disk does not match this build
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Index writer is locked (poisoned or held by another process)
    #[error("Index is locked: {0}")]
    IndexLocked(String),

    /// Client configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Transport(_) | EngineError::Io(_) => true,
            EngineError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => EngineError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => EngineError::Transport(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Transport("refused".into()).is_transient());
        assert!(EngineError::Http {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(EngineError::Http {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!EngineError::Http {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!EngineError::Protocol("bad".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::Http {
            status: 404,
            body: "no such index".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: no such index");
    }
}
