//! Branch poller: turns new head revisions into queued runs.

use edgeship_core::Result;
use edgeship_core::source::{RepositoryRef, SourceConnector, TriggerEvent, TriggerSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::queue::{RunTicket, Scheduler};

/// Polls a branch head and enqueues a run whenever it moves.
pub struct BranchPoller {
    source: Arc<dyn SourceConnector>,
    scheduler: Arc<Scheduler>,
    repository: RepositoryRef,
    pipeline: String,
    interval: Duration,
    last_seen: Option<String>,
}

impl BranchPoller {
    pub fn new(
        source: Arc<dyn SourceConnector>,
        scheduler: Arc<Scheduler>,
        repository: RepositoryRef,
        pipeline: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            scheduler,
            repository,
            pipeline: pipeline.into(),
            interval,
            last_seen: None,
        }
    }

    /// Treat `revision` as already deployed.
    pub fn with_last_seen(mut self, revision: impl Into<String>) -> Self {
        self.last_seen = Some(revision.into());
        self
    }

    /// Check the branch head once. Returns a ticket if a run was queued.
    pub async fn poll_once(&mut self) -> Result<Option<RunTicket>> {
        let revision = self.source.latest_revision(&self.repository).await?;
        if self.last_seen.as_deref() == Some(revision.as_str()) {
            debug!(repo = %self.repository.full_name(), revision = %revision, "Branch unchanged");
            return Ok(None);
        }

        info!(
            repo = %self.repository.full_name(),
            branch = %self.repository.branch,
            revision = %revision,
            "New revision detected"
        );
        let trigger = TriggerEvent::new(self.repository.clone(), &revision, TriggerSource::Poll);
        let ticket = self.scheduler.enqueue(&self.pipeline, trigger).await?;
        self.last_seen = Some(revision);
        Ok(Some(ticket))
    }

    /// Poll forever. Errors are logged and retried on the next tick.
    pub async fn run(mut self) {
        info!(
            repo = %self.repository.full_name(),
            interval_secs = self.interval.as_secs(),
            "Starting branch poller"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                warn!(repo = %self.repository.full_name(), error = %e, "Poll failed");
            }
        }
    }
}
