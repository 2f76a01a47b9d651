//! Branch checkout and pushing

use std::cell::RefCell;

use git2::{build::CheckoutBuilder, Cred, PushOptions, RemoteCallbacks};

use super::repo::GitRepo;
use crate::{Error, Result};

/// Username/token pair used for HTTPS pushes
#[derive(Clone)]
pub struct PushCredentials {
    pub username: String,
    pub token: String,
}

impl std::fmt::Debug for PushCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Make `branch` the checked-out branch
    ///
    /// Does nothing if HEAD is already on `branch`. On an unborn HEAD the
    /// symbolic ref is simply repointed.
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        if self.current_branch()?.as_deref() == Some(branch) {
            return Ok(());
        }

        let repo = self.inner();
        let refname = format!("refs/heads/{}", branch);

        match repo.find_reference(&refname) {
            Ok(reference) => {
                let target = reference.peel_to_commit()?;
                repo.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;
                repo.set_head(&refname)?;
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                if self.head_commit()?.is_some() {
                    return Err(Error::InconsistentState(format!(
                        "Branch '{}' not found in {}",
                        branch,
                        self.root().display()
                    )));
                }
                repo.set_head(&refname)?;
            }
            Err(e) => return Err(Error::Git(e)),
        }

        tracing::info!(root = %self.root().display(), branch, "Checked out branch");
        Ok(())
    }

    /// Push local `branch` to the same branch name on `remote_name`
    ///
    /// A single attempt; callers decide on retries.
    pub fn push_branch(
        &self,
        remote_name: &str,
        branch: &str,
        credentials: Option<&PushCredentials>,
    ) -> Result<()> {
        let mut remote = self.inner().find_remote(remote_name).map_err(|e| {
            Error::Publish(format!("Remote '{}' not found: {}", remote_name, e))
        })?;

        let rejection: RefCell<Option<String>> = RefCell::new(None);

        {
            let mut callbacks = RemoteCallbacks::new();
            if let Some(creds) = credentials {
                callbacks.credentials(move |_url, _username, _allowed| {
                    Cred::userpass_plaintext(&creds.username, &creds.token)
                });
            }
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(format!("{}: {}", refname, message));
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| Error::Publish(format!("Push to '{}' failed: {}", remote_name, e)))?;
        }

        if let Some(reason) = rejection.into_inner() {
            return Err(Error::Publish(format!("Push rejected: {}", reason)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::repo::CommitAuthor;
    use super::*;
    use git2::Repository;
    use tempfile::TempDir;

    fn seeded(dir: &std::path::Path) -> GitRepo {
        let repo = GitRepo::init(dir, "main").unwrap();
        std::fs::write(dir.join("a.txt"), "a").unwrap();
        repo.stage_all().unwrap();
        repo.commit("first", &CommitAuthor::new("T", "t@example.com"))
            .unwrap();
        repo
    }

    #[test]
    fn test_checkout_switches_back_to_main() {
        let dir = TempDir::new().unwrap();
        let repo = seeded(dir.path());

        let head = repo.inner().head().unwrap().peel_to_commit().unwrap();
        repo.inner().branch("feature", &head, false).unwrap();
        repo.inner().set_head("refs/heads/feature").unwrap();
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("feature"));

        repo.checkout_branch("main").unwrap();
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn test_checkout_missing_branch_fails() {
        let dir = TempDir::new().unwrap();
        let repo = seeded(dir.path());
        let err = repo.checkout_branch("gh-pages").unwrap_err();
        assert!(matches!(err, Error::InconsistentState(_)));
    }

    #[test]
    fn test_push_to_local_bare_remote() {
        let work = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        Repository::init_bare(remote.path()).unwrap();

        let repo = seeded(work.path());
        repo.set_remote("origin", remote.path().to_str().unwrap())
            .unwrap();
        repo.push_branch("origin", "main", None).unwrap();

        let bare = Repository::open_bare(remote.path()).unwrap();
        let pushed = bare
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .id()
            .to_string();
        assert_eq!(Some(pushed), repo.head_commit().unwrap());
    }

    #[test]
    fn test_push_to_missing_remote_is_publish_error() {
        let dir = TempDir::new().unwrap();
        let repo = seeded(dir.path());
        let err = repo.push_branch("origin", "main", None).unwrap_err();
        assert!(matches!(err, Error::Publish(_)));
    }
}
