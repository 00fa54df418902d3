//! Error types for Lightning Search.
//!
//! Every failure carries enough context (target, table, status, path) for a
//! caller to diagnose it without retrying blindly.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Lightning Search core.
#[derive(Debug, Error)]
pub enum LightningError {
    // Supervisor errors
    #[error("Search engine binary not found at {path:?}; run install or compile first")]
    BinaryNotFound { path: PathBuf },

    #[error("Compile failed for target {target}: {message}")]
    CompileFailure { target: String, message: String },

    #[error("Failed to stop search engine: {message}")]
    ProcessStopFailure { message: String },

    #[error("Failed to launch search engine: {message}")]
    LaunchFailed { message: String },

    #[error("Invalid engine state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Search errors
    #[error("Search backend unavailable for table {table} (status {status:?}): {message}")]
    SearchBackendUnavailable {
        table: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Entity type {entity_type} has no searchable fields")]
    NotSearchable { entity_type: String },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    // Database errors
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Lightning Search operations.
pub type Result<T> = std::result::Result<T, LightningError>;

impl From<std::io::Error> for LightningError {
    fn from(err: std::io::Error) -> Self {
        LightningError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LightningError {
    fn from(err: serde_json::Error) -> Self {
        LightningError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for LightningError {
    fn from(err: reqwest::Error) -> Self {
        LightningError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for LightningError {
    fn from(err: rusqlite::Error) -> Self {
        LightningError::Store {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl LightningError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LightningError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an IO error with an action description and path context.
    pub fn io(action: &str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        LightningError::Io {
            message: format!("{}: {}", action, err),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether the error came from the entity store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, LightningError::Store { .. })
    }

    /// Process exit code for the command-line front end.
    ///
    /// - 2: missing binary (install first)
    /// - 3: compile failure
    /// - 4: engine unreachable with no fallback configured
    /// - 1: everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            LightningError::BinaryNotFound { .. } => 2,
            LightningError::CompileFailure { .. } => 3,
            LightningError::SearchBackendUnavailable { .. } => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LightningError::CompileFailure {
            target: "windows/x86_64".into(),
            message: "linker not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "Compile failed for target windows/x86_64: linker not found"
        );
    }

    #[test]
    fn test_backend_unavailable_carries_context() {
        let err = LightningError::SearchBackendUnavailable {
            table: "companies".into(),
            status: Some(503),
            message: "service unavailable".into(),
        };
        let text = err.to_string();
        assert!(text.contains("companies"));
        assert!(text.contains("503"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            LightningError::BinaryNotFound {
                path: PathBuf::from("bin/lightning-search")
            }
            .exit_code(),
            2
        );
        assert_eq!(LightningError::Other("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_store_error_conversion() {
        let err: LightningError = rusqlite::Error::InvalidQuery.into();
        assert!(err.is_store_error());
    }
}
