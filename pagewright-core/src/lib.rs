//! Pagewright Core - turn task briefs into published static sites
//!
//! This crate holds everything between an authenticated task event and the
//! evaluation report: the task registry, content generation, git
//! materialization through a hosting provider, and report delivery.

pub mod config;
pub mod error;
pub mod generator;
pub mod git;
pub mod materializer;
pub mod notifier;
pub mod provider;
pub mod registry;
pub mod secrets;
pub mod task;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};
pub use generator::{ChatCompletionsGenerator, ContentGenerator, GenerationRequest};
pub use materializer::{Materializer, PublishSettings};
pub use notifier::{EvaluationReport, Notifier, RetryPolicy};
pub use provider::{LocalProvider, RemoteRepository, RepositoryProvider};
pub use registry::{JsonFileRegistry, MemoryRegistry, TaskRegistry};
pub use secrets::Secrets;
pub use task::{Attachment, FileSet, GeneratedFile, MaterializationResult, TaskEvent};
pub use workflow::{Orchestrator, PipelineOutcome, PipelineStage, TaskQueue, TaskSubmission};
