use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the rule engine when loading, validating or executing
/// rule sets.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rules path does not exist: {0}")]
    MissingPath(String),
    #[error("failed to read rules from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rules from {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid rule {id}: {message}")]
    InvalidRule { id: String, message: String },
    #[error("rule {0} not found")]
    RuleNotFound(String),
    #[error("entity {0} not found")]
    EntityNotFound(String),
    #[error("recommendation index {index} out of range")]
    RecommendationNotFound { index: usize },
    /// Entity store unreachable or otherwise failing. The one error class
    /// that aborts the remaining actions of the current rule firing.
    #[error("entity store failure: {0}")]
    Store(String),
}

impl EngineError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }

    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        EngineError::Parse {
            path: path.into().display().to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_rule(id: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::InvalidRule {
            id: id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
