//! Bounded in-memory log of pipeline runs.

use edgeship_core::RunId;
use edgeship_core::run::RunResult;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Most recent runs first. Past `limit`, the oldest finished runs are dropped;
/// queued and running entries are kept until they finish.
pub struct RunHistory {
    limit: usize,
    runs: RwLock<VecDeque<RunResult>>,
}

impl RunHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            runs: RwLock::new(VecDeque::new()),
        }
    }

    /// Insert a run, or replace the entry with the same run id.
    pub async fn record(&self, result: RunResult) {
        let mut runs = self.runs.write().await;
        if let Some(existing) = runs.iter_mut().find(|r| r.run_id == result.run_id) {
            *existing = result;
            return;
        }
        runs.push_front(result);
        let mut idx = runs.len();
        while runs.len() > self.limit && idx > 0 {
            idx -= 1;
            if runs[idx].status.is_terminal() {
                runs.remove(idx);
            }
        }
    }

    pub async fn get(&self, run_id: RunId) -> Option<RunResult> {
        self.runs
            .read()
            .await
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned()
    }

    /// Up to `limit` runs, optionally of one pipeline, newest first.
    pub async fn list(&self, pipeline: Option<&str>, limit: usize) -> Vec<RunResult> {
        self.runs
            .read()
            .await
            .iter()
            .filter(|r| pipeline.is_none_or(|p| r.pipeline == p))
            .take(limit)
            .cloned()
            .collect()
    }
}
