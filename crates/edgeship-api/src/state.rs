//! Application state.

use edgeship_config::SiteConfig;
use edgeship_core::source::SourceConnector;
use edgeship_core::store::ObjectStore;
use edgeship_scheduler::Scheduler;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub site: Arc<SiteConfig>,
    pub scheduler: Arc<Scheduler>,
    /// Used to resolve the branch head for manual triggers.
    pub source: Arc<dyn SourceConnector>,
    /// The bucket served under `/site`.
    pub store: Arc<dyn ObjectStore>,
    /// HMAC secret for GitHub webhook signatures.
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        site: SiteConfig,
        scheduler: Arc<Scheduler>,
        source: Arc<dyn SourceConnector>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            site: Arc::new(site),
            scheduler,
            source,
            store,
            webhook_secret: None,
        }
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<Arc<str>>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn pipeline_name(&self) -> String {
        self.site.pipeline_name()
    }
}
