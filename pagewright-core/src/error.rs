//! Error types for Pagewright

use thiserror::Error;

/// Result type alias for Pagewright operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Pagewright operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Git error
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Shared secret did not match
    #[error("Invalid secret")]
    Auth,

    /// Content generation failed or returned malformed output
    #[error("Generation error: {0}")]
    Generation(String),

    /// The provider refused to create the remote repository
    #[error("Repository creation failed: {0}")]
    RepositoryCreation(String),

    /// Pushing or publishing the repository failed
    #[error("Publish error: {0}")]
    Publish(String),

    /// Local working copy does not match what the registry expects
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// Evaluation report could not be delivered
    #[error("Notification error: {0}")]
    Notification(String),

    /// Task registry could not be persisted or loaded
    #[error("Registry error: {0}")]
    Registry(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
