//! Task registry: which repository holds each task's artifacts
//!
//! Round 2+ of a task must update the repository that round 1 created, so the
//! mapping from task identity to repository name is kept here and persisted
//! after every change.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// A task's repository and the rounds seen for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub repo_name: String,
    pub rounds: BTreeSet<u32>,
}

/// What `resolve` did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    /// First sighting of the task
    Created,
    /// Round 1 arrived again; the entry was replaced with a fresh repository
    Restarted,
    /// A later round was added to an existing entry
    Extended,
    /// A later round arrived without round 1 on record; registered afresh
    Reregistered,
}

/// Outcome of [`TaskRegistry::resolve`]
#[derive(Debug)]
pub struct Resolution {
    pub entry: RegistryEntry,
    pub action: ResolveAction,
    /// Set when the in-memory update could not be written to durable storage
    pub persist_error: Option<Error>,
}

impl Resolution {
    pub fn repo_name(&self) -> &str {
        &self.entry.repo_name
    }
}

/// Persistent task → repository mapping
pub trait TaskRegistry: Send + Sync {
    /// Look up or create the entry for `task` at `round`
    ///
    /// Never fails: persistence problems are reported in
    /// [`Resolution::persist_error`] and the in-memory state is kept.
    fn resolve(&self, task: &str, round: u32) -> Resolution;

    /// Current entry for `task`, if any
    fn get(&self, task: &str) -> Option<RegistryEntry>;

    /// All entries ordered by task identity
    fn entries(&self) -> Vec<(String, RegistryEntry)>;
}

/// Produces collision-resistant repository names of the form `<task>-<suffix>`
///
/// The suffix is a microsecond timestamp forced to be strictly increasing for
/// the life of the process.
#[derive(Debug, Default)]
pub struct RepoNamer {
    last: AtomicU64,
}

impl RepoNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_name(&self, task: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();

        let mut prev = self.last.load(Ordering::Relaxed);
        let suffix = loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break next,
                Err(actual) => prev = actual,
            }
        };

        format!("{}-{}", sanitize_task(task), suffix)
    }
}

/// Map a task identity onto characters that are valid in a repository name
fn sanitize_task(task: &str) -> String {
    let cleaned: String = task
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();

    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "task".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Apply the round rules to `entries`
fn apply_round(
    entries: &mut BTreeMap<String, RegistryEntry>,
    namer: &RepoNamer,
    task: &str,
    round: u32,
) -> (RegistryEntry, ResolveAction) {
    let fresh = |rounds: &[u32]| RegistryEntry {
        repo_name: namer.fresh_name(task),
        rounds: rounds.iter().copied().collect(),
    };

    let action = match entries.get_mut(task) {
        None => {
            entries.insert(task.to_string(), fresh(&[round]));
            ResolveAction::Created
        }
        Some(existing) if round <= 1 => {
            *existing = fresh(&[round]);
            ResolveAction::Restarted
        }
        Some(existing) if existing.rounds.contains(&1) => {
            existing.rounds.insert(round);
            ResolveAction::Extended
        }
        Some(existing) => {
            *existing = fresh(&[1, round]);
            ResolveAction::Reregistered
        }
    };

    let entry = entries
        .get(task)
        .cloned()
        .unwrap_or_else(|| fresh(&[round]));

    info!(
        task,
        round,
        repo = %entry.repo_name,
        action = ?action,
        "Resolved task repository"
    );

    (entry, action)
}

/// Registry kept only in memory
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<BTreeMap<String, RegistryEntry>>,
    namer: RepoNamer,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRegistry for MemoryRegistry {
    fn resolve(&self, task: &str, round: u32) -> Resolution {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let (entry, action) = apply_round(&mut entries, &self.namer, task, round);
        Resolution {
            entry,
            action,
            persist_error: None,
        }
    }

    fn get(&self, task: &str) -> Option<RegistryEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(task).cloned()
    }

    fn entries(&self) -> Vec<(String, RegistryEntry)> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Registry backed by a JSON document rewritten atomically after each change
///
/// Layout: `{ "<task>": { "repo_name": "...", "rounds": [1, 2] } }`
#[derive(Debug)]
pub struct JsonFileRegistry {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, RegistryEntry>>,
    namer: RepoNamer,
}

impl JsonFileRegistry {
    /// Open the registry at `path`, loading existing entries if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    Error::Registry(format!(
                        "Failed to parse registry {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), tasks = entries.len(), "Loaded task registry");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            namer: RepoNamer::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole document to a temp file beside the target, then rename
    fn persist(&self, entries: &BTreeMap<String, RegistryEntry>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(entries)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| {
            Error::Registry(format!(
                "Failed to replace registry {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        Ok(())
    }
}

impl TaskRegistry for JsonFileRegistry {
    fn resolve(&self, task: &str, round: u32) -> Resolution {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let (entry, action) = apply_round(&mut entries, &self.namer, task, round);

        let persist_error = match self.persist(&entries) {
            Ok(()) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to persist task registry");
                Some(match e {
                    Error::Registry(_) => e,
                    other => Error::Registry(other.to_string()),
                })
            }
        };

        Resolution {
            entry,
            action,
            persist_error,
        }
    }

    fn get(&self, task: &str) -> Option<RegistryEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(task).cloned()
    }

    fn entries(&self) -> Vec<(String, RegistryEntry)> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rounds(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_round_one_twice_gives_different_names() {
        let registry = MemoryRegistry::new();
        let first = registry.resolve("T1", 1);
        let second = registry.resolve("T1", 1);

        assert_eq!(first.action, ResolveAction::Created);
        assert_eq!(second.action, ResolveAction::Restarted);
        assert_ne!(first.repo_name(), second.repo_name());
        assert_eq!(second.entry.rounds, rounds(&[1]));
    }

    #[test]
    fn test_round_two_keeps_name() {
        let registry = MemoryRegistry::new();
        let first = registry.resolve("T1", 1);
        let second = registry.resolve("T1", 2);

        assert_eq!(second.action, ResolveAction::Extended);
        assert_eq!(first.repo_name(), second.repo_name());
        assert_eq!(second.entry.rounds, rounds(&[1, 2]));
    }

    #[test]
    fn test_round_two_without_round_one_registers_fresh() {
        let registry = MemoryRegistry::new();
        let only = registry.resolve("T2", 2);

        assert_eq!(only.action, ResolveAction::Created);
        assert!(only.repo_name().starts_with("T2-"));
        assert_eq!(only.entry.rounds, rounds(&[2]));

        // round 1 still missing, so another late round re-registers
        let again = registry.resolve("T2", 3);
        assert_eq!(again.action, ResolveAction::Reregistered);
        assert_ne!(again.repo_name(), only.repo_name());
        assert_eq!(again.entry.rounds, rounds(&[1, 3]));
    }

    #[test]
    fn test_restart_discards_history() {
        let registry = MemoryRegistry::new();
        registry.resolve("T1", 1);
        registry.resolve("T1", 2);
        let restarted = registry.resolve("T1", 1);

        assert_eq!(restarted.entry.rounds, rounds(&[1]));
        assert_eq!(registry.get("T1").unwrap(), restarted.entry);
    }

    #[test]
    fn test_unusual_rounds_are_recorded() {
        let registry = MemoryRegistry::new();
        registry.resolve("T1", 1);
        let late = registry.resolve("T1", 7);
        assert_eq!(late.entry.rounds, rounds(&[1, 7]));
    }

    #[test]
    fn test_namer_is_strictly_increasing() {
        let namer = RepoNamer::new();
        let names: Vec<String> = (0..100).map(|_| namer.fresh_name("t")).collect();
        let unique: BTreeSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_sanitize_task() {
        assert_eq!(sanitize_task("my task/one"), "my-task-one");
        assert_eq!(sanitize_task("captcha-solver"), "captcha-solver");
        assert_eq!(sanitize_task("..."), "task");
    }

    #[test]
    fn test_json_registry_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("registry.json");

        let name = {
            let registry = JsonFileRegistry::open(&path).unwrap();
            let first = registry.resolve("T1", 1);
            assert!(first.persist_error.is_none());
            registry.resolve("T1", 2);
            first.entry.repo_name
        };

        let reopened = JsonFileRegistry::open(&path).unwrap();
        let entry = reopened.get("T1").unwrap();
        assert_eq!(entry.repo_name, name);
        assert_eq!(entry.rounds, rounds(&[1, 2]));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["T1"]["repo_name"], name.as_str());
        assert_eq!(raw["T1"]["rounds"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_json_registry_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileRegistry::open(&path).unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        // parent is a regular file, so the directory can never be created
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let registry = JsonFileRegistry::open(blocker.join("registry.json")).unwrap();

        let resolution = registry.resolve("T1", 1);
        assert!(matches!(resolution.persist_error, Some(Error::Registry(_))));
        assert_eq!(registry.get("T1").unwrap(), resolution.entry);
    }
}
