//! Task events and the values that flow through the pipeline

use serde::{Deserialize, Serialize};

/// A reference to supporting material shipped with a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name, usually a file name
    pub name: String,
    /// Location of the content; may be a `data:` URI
    pub url: String,
}

/// One inbound task submission, minus the shared secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Caller-supplied identity correlating all rounds of one task
    pub task: String,
    /// Revision cycle; 1 creates, anything later revises
    pub round: u32,
    /// Free-text description of the app to build
    pub brief: String,
    pub attachments: Vec<Attachment>,
    /// Evaluation criteria the generated app should satisfy
    pub checks: Vec<String>,
    /// Where the completion report is posted
    pub evaluation_url: String,
    pub email: String,
    /// Opaque correlation token echoed back to the evaluator
    pub nonce: String,
}

impl TaskEvent {
    /// Whether this event starts a task rather than revising one
    pub fn is_initial_round(&self) -> bool {
        self.round <= 1
    }
}

/// A single generated file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Path relative to the repository root
    pub path: String,
    pub content: Vec<u8>,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Ordered output of the content generator
///
/// Duplicate paths are allowed; the last occurrence wins when written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    files: Vec<GeneratedFile>,
}

impl FileSet {
    pub fn new(files: Vec<GeneratedFile>) -> Self {
        Self { files }
    }

    pub fn push(&mut self, file: GeneratedFile) {
        self.files.push(file);
    }

    pub fn files(&self) -> &[GeneratedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether any entry targets `path`
    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    /// Paths in order of first appearance, without duplicates
    pub fn paths(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for file in &self.files {
            if !seen.contains(&file.path.as_str()) {
                seen.push(file.path.as_str());
            }
        }
        seen
    }
}

impl FromIterator<GeneratedFile> for FileSet {
    fn from_iter<I: IntoIterator<Item = GeneratedFile>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Where a task's artifacts ended up
///
/// Each field is absent when the step producing it failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationResult {
    pub repository_url: Option<String>,
    pub commit_id: Option<String>,
    pub publish_url: Option<String>,
}

impl MaterializationResult {
    /// Whether every field is present
    pub fn is_complete(&self) -> bool {
        self.repository_url.is_some() && self.commit_id.is_some() && self.publish_url.is_some()
    }
}
