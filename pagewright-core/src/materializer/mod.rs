//! Repository materialization
//!
//! Turns a generated file set into a committed, pushed, published repository.
//! Round 1 creates the repository from scratch; later rounds overlay the new
//! files onto the existing working copy and push a follow-up commit.

mod boilerplate;
mod workspace;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::{ProviderConfig, PublishConfig};
use crate::git::{CommitAuthor, GitRepo, PushCredentials};
use crate::provider::RepositoryProvider;
use crate::task::{FileSet, MaterializationResult};
use crate::{Error, Result};

pub use boilerplate::{LICENSE_PATH, README_PATH};
pub use workspace::{overlay_files, safe_relative_path, WorkingCopies, WorkingCopy};

const REMOTE_NAME: &str = "origin";

/// Tunables for pushing and publishing
#[derive(Debug, Clone)]
pub struct PublishSettings {
    /// Branch created on round 1 and updated afterwards
    pub branch: String,
    pub push_attempts: u32,
    pub push_delay: Duration,
    pub pages_poll_attempts: u32,
    pub pages_poll_interval: Duration,
    pub author: CommitAuthor,
    pub license_holder: String,
}

impl PublishSettings {
    pub fn from_config(provider: &ProviderConfig, publish: &PublishConfig) -> Self {
        Self {
            branch: provider.branch.clone(),
            push_attempts: publish.push_attempts.max(1),
            push_delay: publish.push_delay,
            pages_poll_attempts: publish.pages_poll_attempts,
            pages_poll_interval: publish.pages_poll_interval,
            author: CommitAuthor::new(&publish.author_name, &publish.author_email),
            license_holder: publish.license_holder.clone(),
        }
    }
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default(), &PublishConfig::default())
    }
}

/// Publishes file sets through a [`RepositoryProvider`]
pub struct Materializer {
    provider: Arc<dyn RepositoryProvider>,
    copies: WorkingCopies,
    settings: PublishSettings,
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("provider", &self.provider.name())
            .field("workspace", &self.copies.root())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Materializer {
    pub fn new(
        provider: Arc<dyn RepositoryProvider>,
        workspace_dir: impl Into<PathBuf>,
        settings: PublishSettings,
    ) -> Self {
        Self {
            provider,
            copies: WorkingCopies::new(workspace_dir),
            settings,
        }
    }

    pub fn working_copies(&self) -> &WorkingCopies {
        &self.copies
    }

    /// Round 1: create, commit, push and publish a brand-new repository
    pub async fn create_and_publish(
        &self,
        repo_name: &str,
        files: &FileSet,
    ) -> Result<MaterializationResult> {
        let copy = self.copies.acquire(repo_name).await?;
        if copy.is_populated() {
            return Err(Error::InconsistentState(format!(
                "Working copy for '{}' already exists at {}",
                repo_name,
                copy.path().display()
            )));
        }

        let description = format!("Auto-generated site for {}", repo_name);
        let remote = self
            .provider
            .create_repository(repo_name, &description)
            .await
            .map_err(|e| match e {
                Error::RepositoryCreation(_) => e,
                other => Error::RepositoryCreation(other.to_string()),
            })?;
        info!(repo = repo_name, url = %remote.repository_url, "Provisioned repository");

        let all_files = boilerplate::with_boilerplate(
            files,
            repo_name,
            &remote.repository_url,
            &self.settings.license_holder,
            Utc::now(),
        );

        let path = copy.path().to_path_buf();
        let branch = self.settings.branch.clone();
        let author = self.settings.author.clone();
        let remote_url = remote.remote_url.clone();
        let commit_id = run_blocking(move || {
            std::fs::create_dir_all(&path)?;
            overlay_files(&path, &all_files)?;

            let repo = GitRepo::init(&path, &branch)?;
            repo.stage_all()?;
            let commit = repo
                .commit("Initial commit: generated app files", &author)?
                .ok_or_else(|| Error::Other("Initial commit was empty".to_string()))?;
            repo.set_remote(REMOTE_NAME, &remote_url)?;
            Ok(commit)
        })
        .await?;
        info!(repo = repo_name, commit = %commit_id, "Committed initial files");

        self.push_with_retry(copy.path().to_path_buf()).await?;

        let publish_url = self.publish(repo_name).await;

        Ok(MaterializationResult {
            repository_url: Some(remote.repository_url),
            commit_id: Some(commit_id),
            publish_url: Some(publish_url),
        })
    }

    /// Round N>1: overlay `files` onto the existing working copy and push
    ///
    /// An update that changes nothing creates no commit.
    pub async fn update(
        &self,
        repo_name: &str,
        files: &FileSet,
        round: u32,
    ) -> Result<MaterializationResult> {
        let copy = self.copies.acquire(repo_name).await?;
        if !GitRepo::is_git_repo(copy.path()) {
            return Err(Error::InconsistentState(format!(
                "No working copy for '{}' at {}; was round 1 materialized?",
                repo_name,
                copy.path().display()
            )));
        }

        let path = copy.path().to_path_buf();
        let branch = self.settings.branch.clone();
        let author = self.settings.author.clone();
        let files = files.clone();
        let (head, committed) = run_blocking(move || {
            let repo = GitRepo::open(&path)?;
            repo.checkout_branch(&branch)?;

            overlay_files(&path, &files)?;
            repo.stage_all()?;
            if !repo.has_staged_changes()? {
                let head = repo.head_commit()?.ok_or_else(|| {
                    Error::InconsistentState(format!("Working copy {} has no commits", path.display()))
                })?;
                return Ok((head, false));
            }

            append_revision_note(&path, round)?;
            repo.stage_all()?;
            let message = format!("Round {} update: modified as per new brief", round);
            let commit = repo
                .commit(&message, &author)?
                .ok_or_else(|| Error::Other("Update commit was empty".to_string()))?;
            Ok((commit, true))
        })
        .await?;

        if committed {
            info!(repo = repo_name, round, commit = %head, "Committed update");
        } else {
            info!(repo = repo_name, round, commit = %head, "No changes to commit");
        }

        self.push_with_retry(copy.path().to_path_buf()).await?;

        Ok(MaterializationResult {
            repository_url: Some(self.provider.repository_url(repo_name)),
            commit_id: Some(head),
            publish_url: Some(self.provider.pages_url(repo_name)),
        })
    }

    /// Push the canonical branch, retrying a bounded number of times
    async fn push_with_retry(&self, path: PathBuf) -> Result<()> {
        let attempts = self.settings.push_attempts.max(1);
        let credentials: Option<PushCredentials> = self.provider.credentials();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let path = path.clone();
            let branch = self.settings.branch.clone();
            let credentials = credentials.clone();
            let result = run_blocking(move || {
                GitRepo::open(&path)?.push_branch(REMOTE_NAME, &branch, credentials.as_ref())
            })
            .await;

            match result {
                Ok(()) => {
                    info!(branch = %self.settings.branch, attempt, "Pushed branch");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Push failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.push_delay).await;
                    }
                }
            }
        }

        Err(Error::Publish(format!(
            "Push failed after {} attempts: {}",
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Enable pages and wait a bounded time for the site to come up
    ///
    /// Always yields the expected URL; publication latency is not an error.
    async fn publish(&self, repo_name: &str) -> String {
        let url = match self
            .provider
            .enable_pages(repo_name, &self.settings.branch)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!(repo = repo_name, error = %e, "Failed to enable pages");
                self.provider.pages_url(repo_name)
            }
        };

        for attempt in 1..=self.settings.pages_poll_attempts {
            if self.provider.is_live(&url).await {
                info!(repo = repo_name, url = %url, attempt, "Pages site is live");
                return url;
            }
            if attempt < self.settings.pages_poll_attempts {
                tokio::time::sleep(self.settings.pages_poll_interval).await;
            }
        }

        warn!(repo = repo_name, url = %url, "Pages site not live yet, returning expected URL");
        url
    }
}

fn append_revision_note(root: &std::path::Path, round: u32) -> Result<()> {
    use std::io::Write;

    let mut readme = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(root.join(README_PATH))?;
    readme.write_all(boilerplate::revision_note(round, Utc::now()).as_bytes())?;
    Ok(())
}

/// Run blocking git/filesystem work off the async executor
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("Blocking task failed: {}", e)))?
}
