//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Repository name is already taken on the account
    #[error("Repository {0} already exists")]
    RepoExists(String),

    /// HTTP error outside the octocrab client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<Error> for pagewright_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Auth(msg) => pagewright_core::Error::Config(msg),
            other => pagewright_core::Error::Other(other.to_string()),
        }
    }
}
