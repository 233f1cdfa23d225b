use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while declaring, validating, or applying a stack.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML in '{path}': {message}")]
    ParseConfig { path: PathBuf, message: String },

    #[error("Failed to serialize stack document: {0}")]
    Serialize(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unresolved reference to '{token}' from resource '{referrer}'")]
    UnresolvedReference { token: String, referrer: String },

    #[error("Dependency cycle involving resource '{0}'")]
    DependencyCycle(String),

    #[error("Stack not found: {0}")]
    StackNotFound(String),

    #[error("Failed to apply resource '{id}': {message}")]
    ApplyFailed { id: String, message: String },

    #[error("Access denied: principal '{principal}' may not {action} '{resource}'")]
    AccessDenied {
        principal: String,
        action: String,
        resource: String,
    },

    #[error("Invalid query record: {0}")]
    InvalidRecord(String),

    #[error("Engine operation failed: {0}")]
    Engine(String),
}

impl From<serde_yaml::Error> for StackError {
    fn from(err: serde_yaml::Error) -> Self {
        StackError::ParseConfig {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StackError {
    fn from(err: serde_json::Error) -> Self {
        StackError::Serialize(err.to_string())
    }
}

/// Result type for stack operations.
pub type Result<T> = std::result::Result<T, StackError>;
