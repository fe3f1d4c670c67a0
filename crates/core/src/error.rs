//! Error types for the Wannabe domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Prompt building itself
//! never fails; only I/O-facing collaborators produce these.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all Wannabe operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Project file errors ---
    #[error("Project error: {0}")]
    Project(#[from] ProjectError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read project file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse project file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "Server busy".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("Server busy"));
    }

    #[test]
    fn project_error_displays_path() {
        let err = Error::Project(ProjectError::ParseError {
            path: PathBuf::from("/tmp/story.json"),
            reason: "expected value".into(),
        });
        assert!(err.to_string().contains("story.json"));
        assert!(err.to_string().contains("expected value"));
    }
}
