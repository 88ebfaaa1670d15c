//! Per-run lifecycle and cancellation.

use edgeship_core::{Error, Result, RunId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::watch;

/// Where a run is in its lifecycle, as seen by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Queued,
    Running,
    /// The final stage has been entered; the run can no longer be cancelled.
    Final,
    Cancelled,
    Finished,
}

/// Shared handle between a run and whoever may cancel it.
///
/// Phase transitions happen under one lock, so a cancellation either lands
/// before the final stage is entered or is refused.
#[derive(Debug)]
pub struct RunControl {
    run_id: RunId,
    phase: Mutex<RunPhase>,
    cancelled: watch::Sender<bool>,
}

impl RunControl {
    pub fn new(run_id: RunId) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            run_id,
            phase: Mutex::new(RunPhase::Queued),
            cancelled,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
            .lock()
            .map(|p| *p)
            .unwrap_or(RunPhase::Finished)
    }

    fn transition<T>(&self, f: impl FnOnce(&mut RunPhase) -> T) -> Result<T> {
        let mut phase = self
            .phase
            .lock()
            .map_err(|_| Error::Internal("run control poisoned".to_string()))?;
        Ok(f(&mut phase))
    }

    /// Request cancellation.
    pub fn cancel(&self) -> Result<()> {
        let outcome = self.transition(|phase| match *phase {
            RunPhase::Queued | RunPhase::Running => {
                *phase = RunPhase::Cancelled;
                Ok(())
            }
            RunPhase::Cancelled => Ok(()),
            RunPhase::Final => Err(Error::Conflict(format!(
                "run {} has entered its final stage",
                self.run_id
            ))),
            RunPhase::Finished => Err(Error::Conflict(format!(
                "run {} has already finished",
                self.run_id
            ))),
        })?;
        if outcome.is_ok() {
            self.cancelled.send_replace(true);
        }
        outcome
    }

    /// Move to `Running`. Returns false if the run was cancelled while queued.
    pub fn begin(&self) -> bool {
        self.transition(|phase| match *phase {
            RunPhase::Queued => {
                *phase = RunPhase::Running;
                true
            }
            _ => false,
        })
        .unwrap_or(false)
    }

    /// Called before each stage. Returns false if the run was cancelled.
    pub fn enter_stage(&self, is_final: bool) -> bool {
        self.transition(|phase| match *phase {
            RunPhase::Running if is_final => {
                *phase = RunPhase::Final;
                true
            }
            RunPhase::Running | RunPhase::Final => true,
            _ => false,
        })
        .unwrap_or(false)
    }

    pub fn finish(&self) {
        let _ = self.transition(|phase| {
            if *phase != RunPhase::Cancelled {
                *phase = RunPhase::Finished;
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives as long as `self`, so this only ends on cancel.
        let _ = rx.wait_for(|c| *c).await;
    }
}
