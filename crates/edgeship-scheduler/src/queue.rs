//! Single-flight run queue.
//!
//! Each pipeline gets its own FIFO queue and worker task, so at most one run
//! of a pipeline is active at a time while different pipelines proceed
//! independently. Triggers are never reordered or coalesced.

use edgeship_core::run::{RunResult, RunStatus};
use edgeship_core::source::TriggerEvent;
use edgeship_core::{Error, Result, RunId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;

use crate::control::{RunControl, RunPhase};
use crate::history::RunHistory;
use crate::orchestrator::PipelineOrchestrator;
use crate::worker::{ActiveRuns, QueuedRun, Worker};

/// Handle to an enqueued run.
#[derive(Debug)]
pub struct RunTicket {
    pub run_id: RunId,
    result: oneshot::Receiver<RunResult>,
}

impl RunTicket {
    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunResult> {
        let run_id = self.run_id;
        self.result
            .await
            .map_err(|_| Error::Internal(format!("run {} ended without a result", run_id)))
    }
}

/// Routes triggers to per-pipeline queues.
pub struct Scheduler {
    queues: RwLock<HashMap<String, mpsc::UnboundedSender<QueuedRun>>>,
    active: ActiveRuns,
    history: Arc<RunHistory>,
}

impl Scheduler {
    pub fn new(history: Arc<RunHistory>) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            active: Arc::new(Mutex::new(HashMap::new())),
            history,
        }
    }

    pub fn history(&self) -> &Arc<RunHistory> {
        &self.history
    }

    /// Start the worker for a pipeline.
    pub async fn register(&self, orchestrator: PipelineOrchestrator) -> Result<()> {
        let name = orchestrator.name().to_string();
        let mut queues = self.queues.write().await;
        if queues.contains_key(&name) {
            return Err(Error::Conflict(format!(
                "pipeline '{}' is already registered",
                name
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(orchestrator, rx, self.history.clone(), self.active.clone());
        tokio::spawn(worker.run());
        queues.insert(name.clone(), tx);

        info!(pipeline = %name, "Registered pipeline");
        Ok(())
    }

    pub async fn pipelines(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Queue a run of `pipeline` behind any run already queued or in flight.
    pub async fn enqueue(&self, pipeline: &str, trigger: TriggerEvent) -> Result<RunTicket> {
        let queues = self.queues.read().await;
        let tx = queues
            .get(pipeline)
            .ok_or_else(|| Error::NotFound(format!("pipeline '{}'", pipeline)))?;

        let control = Arc::new(RunControl::new(RunId::new()));
        let run_id = control.run_id();
        let (result_tx, result_rx) = oneshot::channel();

        self.history
            .record(RunResult::queued(run_id, pipeline, trigger.clone()))
            .await;
        if let Ok(mut active) = self.active.lock() {
            active.insert(run_id, control.clone());
        }

        info!(
            pipeline = %pipeline,
            run_id = %run_id,
            revision = %trigger.short_revision(),
            source = ?trigger.source,
            "Run queued"
        );

        tx.send(QueuedRun {
            trigger,
            control,
            result: result_tx,
        })
        .map_err(|_| Error::Internal(format!("worker for '{}' has stopped", pipeline)))?;

        Ok(RunTicket {
            run_id,
            result: result_rx,
        })
    }

    fn control(&self, run_id: RunId) -> Option<Arc<RunControl>> {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.get(&run_id).cloned())
    }

    /// Cancel a queued run, or a running one that has not entered its final stage.
    pub async fn cancel(&self, run_id: RunId) -> Result<()> {
        match self.control(run_id) {
            Some(control) => {
                control.cancel()?;
                info!(run_id = %run_id, "Run cancellation requested");
                Ok(())
            }
            None if self.history.get(run_id).await.is_some() => Err(Error::Conflict(format!(
                "run {} has already finished",
                run_id
            ))),
            None => Err(Error::NotFound(format!("run {}", run_id))),
        }
    }

    /// Current view of a run.
    pub async fn status(&self, run_id: RunId) -> Option<RunResult> {
        let mut run = self.history.get(run_id).await?;
        if !run.status.is_terminal() {
            if let Some(control) = self.control(run_id) {
                run.status = match control.phase() {
                    RunPhase::Queued => RunStatus::Queued,
                    RunPhase::Running | RunPhase::Final => RunStatus::Running,
                    RunPhase::Cancelled => RunStatus::Cancelled,
                    RunPhase::Finished => run.status,
                };
            }
        }
        Some(run)
    }

    /// Runs newest first, with live status for the ones not yet finished.
    pub async fn list(&self, pipeline: Option<&str>, limit: usize) -> Vec<RunResult> {
        let mut runs = Vec::new();
        for run in self.history.list(pipeline, limit).await {
            let current = self.status(run.run_id).await.unwrap_or(run);
            runs.push(current);
        }
        runs
    }
}
