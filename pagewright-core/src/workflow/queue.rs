//! Bounded worker pool for task events
//!
//! Intake pushes events into a bounded channel; a fixed number of workers
//! pull from it and run each event through the [`Orchestrator`]. A full
//! channel is reported back to intake instead of blocking it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::task::TaskEvent;

use super::pipeline::Orchestrator;

/// Why an event was not accepted
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Task queue is full")]
    Full,
    #[error("Task queue is shut down")]
    Closed,
}

/// Cheap handle for submitting events; clone freely
#[derive(Debug, Clone)]
pub struct QueueHandle {
    sender: mpsc::Sender<TaskEvent>,
}

impl QueueHandle {
    /// Wrap an existing sender; whoever holds the receiver consumes the events
    pub fn from_sender(sender: mpsc::Sender<TaskEvent>) -> Self {
        Self { sender }
    }

    /// Enqueue without waiting
    pub fn submit(&self, event: TaskEvent) -> Result<(), SubmitError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

/// Owns the workers; dropping the last handle and calling
/// [`TaskQueue::shutdown`] drains what is queued
#[derive(Debug)]
pub struct TaskQueue {
    handle: QueueHandle,
    workers: Vec<JoinHandle<()>>,
}

impl TaskQueue {
    /// Spawn `workers` workers reading from a channel holding `capacity` events
    pub fn start(orchestrator: Arc<Orchestrator>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|id| tokio::spawn(worker(id, orchestrator.clone(), receiver.clone())))
            .collect();

        Self {
            handle: QueueHandle { sender },
            workers,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn submit(&self, event: TaskEvent) -> Result<(), SubmitError> {
        self.handle.submit(event)
    }

    /// Stop accepting, let workers finish everything already queued, and wait
    ///
    /// Outstanding [`QueueHandle`] clones keep the channel open; drop them first.
    pub async fn shutdown(self) {
        let TaskQueue { handle, workers } = self;
        drop(handle);

        info!(workers = workers.len(), "Draining task queue");
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker exited abnormally");
            }
        }
        info!("Task queue drained");
    }
}

async fn worker(
    id: usize,
    orchestrator: Arc<Orchestrator>,
    receiver: Arc<Mutex<mpsc::Receiver<TaskEvent>>>,
) {
    debug!(worker = id, "Worker started");

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(event) = next else { break };

        let task = event.task.clone();
        let round = event.round;
        let orchestrator = orchestrator.clone();

        // run in its own task so a panic in one event does not take the worker down
        let run = tokio::spawn(async move {
            orchestrator.run(event).await;
        });
        if let Err(e) = run.await {
            error!(worker = id, task = %task, round, error = %e, "Pipeline task aborted");
        }
    }

    debug!(worker = id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{FileSet, GeneratedFile};
    use crate::workflow::pipeline::tests::{event, harness};

    #[tokio::test]
    async fn test_shutdown_drains_queued_events() {
        let h = harness(200);
        for _ in 0..3 {
            h.generator
                .push(Ok(FileSet::new(vec![GeneratedFile::new("index.html", "x")])));
        }
        let reports = h.reports.clone();
        let _dir = h._dir;

        let queue = TaskQueue::start(Arc::new(h.orchestrator), 2, 8);
        queue.submit(event("A", 1, "a")).unwrap();
        queue.submit(event("B", 1, "b")).unwrap();
        queue.submit(event("C", 1, "c")).unwrap();
        queue.shutdown().await;

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 3);
        let mut tasks: Vec<_> = reports.iter().map(|(_, r)| r.task.clone()).collect();
        tasks.sort();
        assert_eq!(tasks, vec!["A", "B", "C"]);
        assert!(reports.iter().all(|(_, r)| r.commit_sha.is_some()));
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let (sender, _receiver) = mpsc::channel(1);
        let handle = QueueHandle { sender };

        handle.submit(event("A", 1, "a")).unwrap();
        assert_eq!(handle.submit(event("B", 1, "b")), Err(SubmitError::Full));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let handle = QueueHandle { sender };
        assert_eq!(handle.submit(event("A", 1, "a")), Err(SubmitError::Closed));
    }
}
