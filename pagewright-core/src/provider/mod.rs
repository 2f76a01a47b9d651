//! Repository hosting abstraction
//!
//! The materializer never talks to a hosting service directly; it goes
//! through [`RepositoryProvider`], which covers creating the remote,
//! addressing it, and turning a pushed branch into a public site.

mod local;

use async_trait::async_trait;

use crate::git::PushCredentials;
use crate::Result;

pub use local::LocalProvider;

/// A freshly provisioned remote repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    pub name: String,
    /// Public, human-facing repository URL
    pub repository_url: String,
    /// URL that git pushes to
    pub remote_url: String,
}

/// Hosting service capable of storing repositories and publishing them
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Create an empty public repository called `name`
    ///
    /// Fails with [`crate::Error::RepositoryCreation`] when the provider
    /// refuses, e.g. because the name is taken.
    async fn create_repository(&self, name: &str, description: &str) -> Result<RemoteRepository>;

    /// Publish `branch` of `name` as a static site, returning its public URL
    ///
    /// Publication is eventually consistent; the URL may not serve content yet.
    async fn enable_pages(&self, name: &str, branch: &str) -> Result<String>;

    /// Whether `url` currently serves content
    async fn is_live(&self, url: &str) -> bool;

    /// Public repository URL for `name`
    fn repository_url(&self, name: &str) -> String;

    /// Push URL for `name`
    fn remote_url(&self, name: &str) -> String;

    /// Expected static-site URL for `name`
    fn pages_url(&self, name: &str) -> String;

    /// Credentials for pushing, if the remote needs any
    fn credentials(&self) -> Option<PushCredentials>;
}
