//! Worker that executes the queued runs of one pipeline, one at a time.

use edgeship_core::RunId;
use edgeship_core::run::RunResult;
use edgeship_core::source::TriggerEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::control::RunControl;
use crate::history::RunHistory;
use crate::orchestrator::PipelineOrchestrator;

/// Controls of runs that are queued or in flight, by run id.
pub(crate) type ActiveRuns = Arc<Mutex<HashMap<RunId, Arc<RunControl>>>>;

/// A trigger waiting for its pipeline's worker.
pub(crate) struct QueuedRun {
    pub trigger: TriggerEvent,
    pub control: Arc<RunControl>,
    pub result: oneshot::Sender<RunResult>,
}

/// Drains a pipeline's queue in FIFO order.
pub struct Worker {
    orchestrator: PipelineOrchestrator,
    queue: mpsc::UnboundedReceiver<QueuedRun>,
    history: Arc<RunHistory>,
    active: ActiveRuns,
}

impl Worker {
    pub(crate) fn new(
        orchestrator: PipelineOrchestrator,
        queue: mpsc::UnboundedReceiver<QueuedRun>,
        history: Arc<RunHistory>,
        active: ActiveRuns,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            history,
            active,
        }
    }

    /// Run the worker loop until the queue's sender is dropped.
    pub async fn run(mut self) {
        let pipeline = self.orchestrator.name().to_string();
        info!(pipeline = %pipeline, "Starting worker");

        while let Some(job) = self.queue.recv().await {
            let run_id = job.control.run_id();
            info!(pipeline = %pipeline, run_id = %run_id, "Dequeued run");

            let result = self.orchestrator.run(job.trigger, &job.control).await;

            self.history.record(result.clone()).await;
            if let Ok(mut active) = self.active.lock() {
                active.remove(&run_id);
            }
            // Webhook and poller triggers do not wait for the result.
            let _ = job.result.send(result);
        }

        info!(pipeline = %pipeline, "Worker stopped");
    }
}
