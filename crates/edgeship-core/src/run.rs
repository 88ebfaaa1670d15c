//! Pipeline run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RunId;
use crate::error::FailureKind;
use crate::pipeline::{ActionKind, ActionStatus};
use crate::source::TriggerEvent;

/// Overall status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting behind another run of the same pipeline.
    Queued,
    Running,
    Succeeded,
    Failed { stage: String, action: String },
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed { .. } | RunStatus::Cancelled
        )
    }
}

/// The error surfaced to the operator for a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub stage: String,
    pub action: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one action in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub stage: String,
    pub action: String,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub pipeline: String,
    pub trigger: TriggerEvent,
    pub status: RunStatus,
    /// Actions that were dispatched or skipped, in stage order.
    pub actions: Vec<ActionRecord>,
    /// First failing action, if any.
    pub failure: Option<ActionFailure>,
    /// Object keys confirmed written by the deploy action.
    pub deployed_objects: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunResult {
    pub fn queued(run_id: RunId, pipeline: impl Into<String>, trigger: TriggerEvent) -> Self {
        Self {
            run_id,
            pipeline: pipeline.into(),
            trigger,
            status: RunStatus::Queued,
            actions: Vec::new(),
            failure: None,
            deployed_objects: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded)
    }

    pub fn action(&self, name: &str) -> Option<&ActionRecord> {
        self.actions.iter().find(|a| a.action == name)
    }

    /// Whether any action of `stage` was dispatched.
    pub fn stage_dispatched(&self, stage: &str) -> bool {
        self.actions
            .iter()
            .any(|a| a.stage == stage && a.started_at.is_some())
    }
}
