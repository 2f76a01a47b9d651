//! Task workflow: intake, the per-event pipeline, and the worker pool
//!
//! An authenticated [`TaskSubmission`] becomes a [`crate::task::TaskEvent`],
//! is queued on a [`TaskQueue`], and is driven through the stages of
//! [`PipelineStage`] by an [`Orchestrator`].

pub mod intake;
pub mod pipeline;
pub mod queue;

pub use intake::{Acknowledgement, TaskSubmission};
pub use pipeline::{Orchestrator, PipelineOutcome, PipelineStage, StageFailure};
pub use queue::{QueueHandle, SubmitError, TaskQueue};
