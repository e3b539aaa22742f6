//! Error types for bubblebox core.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON5 parse error: {0}")]
    Json5(String),

    #[error("Required environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Access-policy errors detected without touching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Path traversal attempt: pattern `{pattern}` contains a `..` segment")]
    PathTraversal { pattern: String },

    #[error("Pattern key has no alternatives")]
    EmptyKey,

    #[error("Pattern key `{key}` has an empty alternative")]
    EmptyAlternative { key: String },
}
