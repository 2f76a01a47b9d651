//! Git working copy operations

use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature};

use crate::{Error, Result};

/// Author identity used for generated commits
#[derive(Debug, Clone)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    fn signature(&self) -> Result<Signature<'static>> {
        Ok(Signature::now(&self.name, &self.email)?)
    }
}

/// A git working copy wrapper providing pagewright-specific operations
pub struct GitRepo {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the working tree root
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open the working copy rooted exactly at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::InconsistentState(format!(
                    "No git working copy at {}",
                    path.display()
                ))
            } else {
                Error::Git(e)
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::InconsistentState("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Initialise a new working copy whose unborn HEAD points at `branch`
    pub fn init(path: impl AsRef<Path>, branch: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch);

        let repo = Repository::init_opts(path, &opts)?;
        let root = repo
            .workdir()
            .ok_or_else(|| Error::Other("Initialised repository has no working tree".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Check if `path` is the root of a git working copy
    pub fn is_git_repo(path: impl AsRef<Path>) -> bool {
        Repository::open(path.as_ref()).is_ok()
    }

    /// Get the working tree root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(Error::Git(e)),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    /// SHA of the commit HEAD points at, if any
    pub fn head_commit(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id().to_string())),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(Error::Git(e)),
        }
    }

    /// Stage every addition, modification and deletion in the working tree
    pub fn stage_all(&self) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    /// Whether the index differs from the HEAD tree
    pub fn has_staged_changes(&self) -> Result<bool> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;

        match self.repo.head() {
            Ok(head) => Ok(head.peel_to_tree()?.id() != tree_id),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(true),
            Err(e) => Err(Error::Git(e)),
        }
    }

    /// Commit the index on top of HEAD
    ///
    /// Returns `None` without committing when the index matches HEAD.
    pub fn commit(&self, message: &str, author: &CommitAuthor) -> Result<Option<String>> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(Error::Git(e)),
        };

        if let Some(ref parent) = parent {
            if parent.tree_id() == tree_id {
                return Ok(None);
            }
        }

        let signature = author.signature()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        tracing::debug!(root = %self.root.display(), commit = %oid, "Created commit");
        Ok(Some(oid.to_string()))
    }

    /// Point `name` at `url`, creating the remote if needed
    pub fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        match self.repo.find_remote(name) {
            Ok(_) => self.repo.remote_set_url(name, url)?,
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                self.repo.remote(name, url)?;
            }
            Err(e) => return Err(Error::Git(e)),
        }
        Ok(())
    }

    /// URL of a configured remote
    pub fn remote_url(&self, name: &str) -> Result<Option<String>> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(|u| u.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(Error::Git(e)),
        }
    }

    /// Get access to the underlying git2 repository
    pub fn inner(&self) -> &Repository {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn author() -> CommitAuthor {
        CommitAuthor::new("Test", "test@example.com")
    }

    #[test]
    fn test_init_uses_requested_branch() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::init(dir.path(), "main").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        repo.stage_all().unwrap();
        repo.commit("init", &author()).unwrap();

        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
        assert!(GitRepo::is_git_repo(dir.path()));
    }

    #[test]
    fn test_commit_is_noop_without_changes() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::init(dir.path(), "main").unwrap();
        assert!(repo.head_commit().unwrap().is_none());

        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        repo.stage_all().unwrap();
        assert!(repo.has_staged_changes().unwrap());
        let first = repo.commit("first", &author()).unwrap();
        assert!(first.is_some());
        assert_eq!(repo.head_commit().unwrap(), first);

        repo.stage_all().unwrap();
        assert!(!repo.has_staged_changes().unwrap());
        assert!(repo.commit("second", &author()).unwrap().is_none());
        assert_eq!(repo.head_commit().unwrap(), first);
    }

    #[test]
    fn test_stage_all_picks_up_deletions() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::init(dir.path(), "main").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        repo.stage_all().unwrap();
        repo.commit("first", &author()).unwrap();

        std::fs::remove_file(dir.path().join("b.txt")).unwrap();
        repo.stage_all().unwrap();
        assert!(repo.has_staged_changes().unwrap());
    }

    #[test]
    fn test_set_remote_creates_then_updates() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::init(dir.path(), "main").unwrap();
        assert!(repo.remote_url("origin").unwrap().is_none());

        repo.set_remote("origin", "https://example.com/a.git").unwrap();
        repo.set_remote("origin", "https://example.com/b.git").unwrap();
        assert_eq!(
            repo.remote_url("origin").unwrap().as_deref(),
            Some("https://example.com/b.git")
        );
    }

    #[test]
    fn test_open_non_git_dir() {
        let dir = TempDir::new().unwrap();
        let result = GitRepo::open(dir.path());
        assert!(matches!(result, Err(Error::InconsistentState(_))));
    }
}
