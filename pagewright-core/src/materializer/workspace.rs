//! Local working copies and file overlay
//!
//! Every repository has one working copy under the workspace directory.
//! Access goes through [`WorkingCopies::acquire`], which hands out a handle
//! holding a per-name lock so two pipelines never touch the same tree at once.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::task::FileSet;
use crate::{Error, Result};

/// Directory git keeps its internals in; never written by an overlay
const GIT_DIR: &str = ".git";

/// Registry of working copies keyed by repository name
#[derive(Debug)]
pub struct WorkingCopies {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive handle to one working copy
#[derive(Debug)]
pub struct WorkingCopy {
    name: String,
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl WorkingCopy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory exists and has anything in it
    pub fn is_populated(&self) -> bool {
        std::fs::read_dir(&self.path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }
}

impl WorkingCopies {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Wait for exclusive access to the working copy of `name`
    pub async fn acquire(&self, name: &str) -> Result<WorkingCopy> {
        if name.is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
        {
            return Err(Error::InconsistentState(format!(
                "Invalid repository name '{}'",
                name
            )));
        }

        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        debug!(repo = name, "Acquired working copy");

        Ok(WorkingCopy {
            name: name.to_string(),
            path: self.root.join(name),
            _guard: guard,
        })
    }
}

/// Validate a generator-supplied path and make it relative to the tree root
///
/// Rejects absolute paths, parent traversal, and anything inside `.git`.
pub fn safe_relative_path(raw: &str) -> Result<PathBuf> {
    let mut out = PathBuf::new();

    for component in Path::new(raw.trim()).components() {
        match component {
            Component::Normal(part) => {
                if part == GIT_DIR {
                    return Err(Error::Other(format!("Refusing to write inside {}: {}", GIT_DIR, raw)));
                }
                out.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Other(format!("Path escapes the repository: {}", raw)));
            }
        }
    }

    if out.as_os_str().is_empty() {
        return Err(Error::Other(format!("Empty file path: '{}'", raw)));
    }

    Ok(out)
}

/// Write `files` into `root`, leaving files not in the set untouched
///
/// Each file goes to a temporary file in its destination directory and is
/// then renamed into place, so a partially written file is never visible at
/// its final path. Later duplicates overwrite earlier ones. Unsafe paths are
/// skipped. Returns the number of files written.
pub fn overlay_files(root: &Path, files: &FileSet) -> Result<usize> {
    let mut written = 0;

    for file in files.files() {
        let relative = match safe_relative_path(&file.path) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %file.path, error = %e, "Skipping generated file");
                continue;
            }
        };

        let dest = root.join(&relative);
        let dir = dest.parent().unwrap_or(root);
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&file.content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| Error::Io(e.error))?;

        written += 1;
    }

    debug!(root = %root.display(), written, "Overlaid generated files");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::GeneratedFile;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(safe_relative_path("index.html").unwrap(), PathBuf::from("index.html"));
        assert_eq!(
            safe_relative_path("./js/app.js").unwrap(),
            PathBuf::from("js/app.js")
        );
        assert!(safe_relative_path("../escape.txt").is_err());
        assert!(safe_relative_path("/etc/passwd").is_err());
        assert!(safe_relative_path(".git/config").is_err());
        assert!(safe_relative_path("assets/.git/hooks/pre-commit").is_err());
        assert!(safe_relative_path("").is_err());
        assert!(safe_relative_path(".").is_err());
    }

    #[test]
    fn test_overlay_leaves_other_files_alone() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old a").unwrap();
        std::fs::write(dir.path().join("b.txt"), [0u8, 159, 146, 150]).unwrap();

        let files = FileSet::new(vec![GeneratedFile::new("a.txt", "new a")]);
        assert_eq!(overlay_files(dir.path(), &files).unwrap(), 1);

        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new a");
        assert_eq!(
            std::fs::read(dir.path().join("b.txt")).unwrap(),
            vec![0u8, 159, 146, 150]
        );
    }

    #[test]
    fn test_overlay_last_duplicate_wins_and_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let files = FileSet::new(vec![
            GeneratedFile::new("css/site.css", "first"),
            GeneratedFile::new("css/site.css", "second"),
        ]);
        overlay_files(dir.path(), &files).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("css/site.css")).unwrap(),
            "second"
        );
    }

    #[test]
    fn test_overlay_skips_git_internals() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

        let files = FileSet::new(vec![
            GeneratedFile::new(".git/HEAD", "garbage"),
            GeneratedFile::new("index.html", "<h1>ok</h1>"),
        ]);
        assert_eq!(overlay_files(dir.path(), &files).unwrap(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".git/HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
    }

    #[test]
    fn test_overlay_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let files = FileSet::new(vec![GeneratedFile::new("index.html", "x")]);
        overlay_files(dir.path(), &files).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("index.html")]);
    }

    #[tokio::test]
    async fn test_acquire_serializes_same_name() {
        let dir = TempDir::new().unwrap();
        let copies = Arc::new(WorkingCopies::new(dir.path()));

        let first = copies.acquire("site").await.unwrap();
        assert_eq!(first.path(), dir.path().join("site"));

        let contender = {
            let copies = copies.clone();
            tokio::spawn(async move { copies.acquire("site").await.map(|c| c.name().to_string()) })
        };

        // a different name is not blocked
        let other = tokio::time::timeout(Duration::from_secs(1), copies.acquire("other"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.name(), "other");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(first);
        assert_eq!(contender.await.unwrap().unwrap(), "site");
    }

    #[tokio::test]
    async fn test_acquire_rejects_path_like_names() {
        let copies = WorkingCopies::new("/tmp/unused");
        assert!(copies.acquire("../x").await.is_err());
        assert!(copies.acquire("").await.is_err());
    }
}
