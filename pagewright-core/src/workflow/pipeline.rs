//! Task pipeline state machine
//!
//! Each accepted task event walks through:
//! 1. Registered: resolve the repository name for the task and round
//! 2. Generated: ask the content generator for the site files
//! 3. Materialized: create (round 1) or update (later rounds) the repository
//! 4. Notified: report whatever is available to the evaluator
//!
//! A failing stage is recorded and the pipeline carries on with absent
//! values, so the evaluator always hears back.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::generator::{ContentGenerator, GenerationRequest};
use crate::materializer::Materializer;
use crate::notifier::{EvaluationReport, Notifier};
use crate::registry::TaskRegistry;
use crate::task::{FileSet, MaterializationResult, TaskEvent};
use crate::Error;

/// Where a task event is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineStage {
    /// Authenticated and queued
    #[default]
    Received,
    /// Repository name resolved
    Registered,
    /// Generator consulted
    Generated,
    /// Repository written and pushed
    Materialized,
    /// Evaluator contacted
    Notified,
    /// Nothing left to do
    Done,
}

impl PipelineStage {
    /// Get the next stage
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Received => Some(PipelineStage::Registered),
            PipelineStage::Registered => Some(PipelineStage::Generated),
            PipelineStage::Generated => Some(PipelineStage::Materialized),
            PipelineStage::Materialized => Some(PipelineStage::Notified),
            PipelineStage::Notified => Some(PipelineStage::Done),
            PipelineStage::Done => None,
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Received => "Task received",
            PipelineStage::Registered => "Repository resolved",
            PipelineStage::Generated => "App generated",
            PipelineStage::Materialized => "Repository published",
            PipelineStage::Notified => "Evaluator notified",
            PipelineStage::Done => "Pipeline complete",
        }
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A stage that did not succeed, and why
#[derive(Debug)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub error: Error,
}

/// Everything that happened to one task event
#[derive(Debug)]
pub struct PipelineOutcome {
    pub task: String,
    pub round: u32,
    pub stage: PipelineStage,
    pub repo_name: Option<String>,
    /// Number of generated files, if generation succeeded
    pub generated_files: Option<usize>,
    pub result: MaterializationResult,
    /// Whether the evaluator acknowledged the report
    pub delivered: bool,
    pub failures: Vec<StageFailure>,
}

impl PipelineOutcome {
    fn new(event: &TaskEvent) -> Self {
        Self {
            task: event.task.clone(),
            round: event.round,
            stage: PipelineStage::Received,
            repo_name: None,
            generated_files: None,
            result: MaterializationResult::default(),
            delivered: false,
            failures: Vec::new(),
        }
    }

    /// Move to the next stage
    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            self.stage = next;
        }
    }

    fn fail(&mut self, error: Error) {
        warn!(task = %self.task, round = self.round, stage = ?self.stage, error = %error, "Pipeline stage failed");
        self.failures.push(StageFailure {
            stage: self.stage,
            error,
        });
    }

    /// Whether `stage` recorded a failure
    pub fn failed_at(&self, stage: PipelineStage) -> bool {
        self.failures.iter().any(|f| f.stage == stage)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.delivered
    }
}

/// Runs task events through the pipeline
pub struct Orchestrator {
    registry: Arc<dyn TaskRegistry>,
    generator: Arc<dyn ContentGenerator>,
    materializer: Materializer,
    notifier: Notifier,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("materializer", &self.materializer)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        generator: Arc<dyn ContentGenerator>,
        materializer: Materializer,
        notifier: Notifier,
    ) -> Self {
        Self {
            registry,
            generator,
            materializer,
            notifier,
        }
    }

    /// Drive one event to completion
    ///
    /// Never fails; per-stage problems are collected in the outcome.
    pub async fn run(&self, event: TaskEvent) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::new(&event);
        info!(task = %event.task, round = event.round, "Processing task");

        // Registered
        outcome.advance();
        // the file-backed registry writes to disk under a lock
        let registry = Arc::clone(&self.registry);
        let (task, round) = (event.task.clone(), event.round);
        let lookup = tokio::task::spawn_blocking(move || registry.resolve(&task, round));
        let resolution = match lookup.await {
            Ok(resolution) => resolution,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                outcome.fail(Error::Registry(format!("Registry lookup did not finish: {}", e)));
                log_outcome(&outcome);
                return outcome;
            }
        };
        let repo_name = resolution.entry.repo_name.clone();
        outcome.repo_name = Some(repo_name.clone());
        if let Some(e) = resolution.persist_error {
            outcome.fail(e);
        }

        // Generated
        outcome.advance();
        let files = match self.generate(&event, &repo_name).await {
            Ok(files) => {
                outcome.generated_files = Some(files.len());
                Some(files)
            }
            Err(e) => {
                outcome.fail(e);
                None
            }
        };

        // Materialized
        outcome.advance();
        if let Some(files) = files {
            match self.materialize(&event, &repo_name, &files).await {
                Ok(result) => outcome.result = result,
                Err(e) => outcome.fail(e),
            }
        }

        // Notified
        outcome.advance();
        let report = EvaluationReport::new(&event, &outcome.result);
        match self.notifier.notify(&event.evaluation_url, &report).await {
            Ok(delivered) => outcome.delivered = delivered,
            Err(e) => outcome.fail(e),
        }

        outcome.advance();
        log_outcome(&outcome);
        outcome
    }

    async fn generate(&self, event: &TaskEvent, repo_name: &str) -> crate::Result<FileSet> {
        let request = GenerationRequest {
            repo_name: repo_name.to_string(),
            brief: event.brief.clone(),
            attachments: event.attachments.clone(),
            checks: event.checks.clone(),
            round: event.round,
        };

        let files = self.generator.generate(&request).await.map_err(|e| match e {
            Error::Generation(_) => e,
            other => Error::Generation(other.to_string()),
        })?;

        if files.is_empty() {
            return Err(Error::Generation("Generator returned no files".to_string()));
        }

        Ok(files)
    }

    async fn materialize(
        &self,
        event: &TaskEvent,
        repo_name: &str,
        files: &FileSet,
    ) -> crate::Result<MaterializationResult> {
        if event.is_initial_round() {
            self.materializer.create_and_publish(repo_name, files).await
        } else {
            self.materializer.update(repo_name, files, event.round).await
        }
    }
}

fn log_outcome(outcome: &PipelineOutcome) {
    if outcome.is_clean() {
        info!(
            task = %outcome.task,
            round = outcome.round,
            repo = ?outcome.repo_name,
            commit = ?outcome.result.commit_id,
            pages = ?outcome.result.publish_url,
            "Round completed"
        );
    } else {
        let failed: Vec<String> = outcome
            .failures
            .iter()
            .map(|f| format!("{:?}: {}", f.stage, f.error))
            .collect();
        error!(
            task = %outcome.task,
            round = outcome.round,
            repo = ?outcome.repo_name,
            delivered = outcome.delivered,
            failures = ?failed,
            "Round completed with failures"
        );
    }
}
