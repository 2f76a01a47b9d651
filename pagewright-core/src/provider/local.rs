//! Provider that keeps bare repositories in a local directory
//!
//! Used for offline runs and tests. "Publishing" exposes the bare repository
//! path as a `file://` URL.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::Repository;
use tracing::info;

use super::{RemoteRepository, RepositoryProvider};
use crate::git::PushCredentials;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of the bare repository for `name`
    pub fn bare_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.git", name))
    }
}

#[async_trait]
impl RepositoryProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn create_repository(&self, name: &str, _description: &str) -> Result<RemoteRepository> {
        let path = self.bare_path(name);
        if path.exists() {
            return Err(Error::RepositoryCreation(format!(
                "Repository '{}' already exists at {}",
                name,
                path.display()
            )));
        }

        std::fs::create_dir_all(&self.root)
            .map_err(|e| Error::RepositoryCreation(format!("Failed to create {}: {}", self.root.display(), e)))?;
        Repository::init_bare(&path)
            .map_err(|e| Error::RepositoryCreation(format!("Failed to init {}: {}", path.display(), e)))?;

        info!(repo = name, path = %path.display(), "Created local bare repository");

        Ok(RemoteRepository {
            name: name.to_string(),
            repository_url: self.repository_url(name),
            remote_url: self.remote_url(name),
        })
    }

    async fn enable_pages(&self, name: &str, _branch: &str) -> Result<String> {
        if !self.bare_path(name).exists() {
            return Err(Error::Publish(format!("Repository '{}' does not exist", name)));
        }
        Ok(self.pages_url(name))
    }

    async fn is_live(&self, url: &str) -> bool {
        url.strip_prefix("file://")
            .map(|path| Path::new(path).exists())
            .unwrap_or(false)
    }

    fn repository_url(&self, name: &str) -> String {
        format!("file://{}", self.bare_path(name).display())
    }

    fn remote_url(&self, name: &str) -> String {
        self.bare_path(name).display().to_string()
    }

    fn pages_url(&self, name: &str) -> String {
        format!("file://{}/", self.bare_path(name).display())
    }

    fn credentials(&self) -> Option<PushCredentials> {
        None
    }
}
