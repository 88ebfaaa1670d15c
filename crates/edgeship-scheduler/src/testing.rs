//! Fakes shared by the scheduler tests.

use async_trait::async_trait;
use edgeship_core::Result;
use edgeship_core::artifact::{Artifact, ArtifactTree};
use edgeship_core::build::BuildRunner;
use edgeship_core::context::ExecutionContext;
use edgeship_core::source::{RepositoryRef, SourceConnector, TriggerEvent, TriggerSource};
use edgeship_core::Error;
use edgeship_deployer::{MemoryDistribution, MemoryObjectStore};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::orchestrator::{Collaborators, PipelineOrchestrator};

pub(crate) const DOCS_SITE: &str = r#"
    site "docs" {
        domain "example.com"
        subdomain "docs"
    }
    source {
        owner "acme"
        repository "docs-site"
        branch "main"
        credential "github-connection"
    }
    build {
        run "make site"
        env {
            SITE_URL "${site.base_url}"
            COMMIT "${git.short_sha}"
        }
    }
    store "docs-site-bucket" {
        backend "memory"
    }
    distribution "E2QWRUHAPOMQZL" {
        backend "memory"
    }
"#;

pub(crate) const REVISION: &str = "4f2c9e1a7b3d5f60718293a4b5c6d7e8f9012345";

/// Serves `content/index.md` naming the requested revision.
pub(crate) struct FakeSource {
    pub fetches: AtomicUsize,
    pub head: Mutex<String>,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            head: Mutex::new(REVISION.to_string()),
        }
    }
}

#[async_trait]
impl SourceConnector for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn latest_revision(&self, _repository: &RepositoryRef) -> Result<String> {
        Ok(self.head.lock().unwrap().clone())
    }

    async fn fetch(&self, _repository: &RepositoryRef, revision: &str) -> Result<ArtifactTree> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut tree = ArtifactTree::new();
        tree.insert("content/index.md", format!("# Docs at {}", revision))?;
        Ok(tree)
    }
}

/// Renders the source into `index.html`, stamped with `BASEURL`.
#[derive(Default)]
pub(crate) struct FakeBuilder {
    pub fail: Option<&'static str>,
    pub delay: Option<Duration>,
    pub seen_env: Mutex<Option<BTreeMap<String, String>>>,
    pub running: AtomicUsize,
    /// Highest number of builds observed running at once.
    pub peak: AtomicUsize,
}

#[async_trait]
impl BuildRunner for FakeBuilder {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn build(&self, source: &Artifact, ctx: &ExecutionContext) -> Result<ArtifactTree> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        *self.seen_env.lock().unwrap() = Some(ctx.env.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = self.fail {
            return Err(Error::Build {
                message: message.to_string(),
                exit_code: Some(1),
            });
        }

        let body = source.tree.get("content/index.md").cloned().unwrap_or_default();
        let mut tree = ArtifactTree::new();
        tree.insert(
            "index.html",
            format!(
                "<base href=\"{}\">{}",
                ctx.base_url().unwrap_or_default(),
                String::from_utf8_lossy(&body)
            ),
        )?;
        tree.insert("css/site.css", "body{}")?;
        Ok(tree)
    }
}

pub(crate) struct Harness {
    pub source: Arc<FakeSource>,
    pub builder: Arc<FakeBuilder>,
    pub store: Arc<MemoryObjectStore>,
    pub distribution: Arc<MemoryDistribution>,
}

impl Harness {
    pub fn new(builder: FakeBuilder, distribution: MemoryDistribution) -> Self {
        Self {
            source: Arc::new(FakeSource::default()),
            builder: Arc::new(builder),
            store: Arc::new(MemoryObjectStore::new("docs-site-bucket")),
            distribution: Arc::new(distribution),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: self.source.clone(),
            builder: self.builder.clone(),
            store: self.store.clone(),
            distribution: self.distribution.clone(),
        }
    }

    pub fn orchestrator(&self) -> PipelineOrchestrator {
        let site = edgeship_config::parse_site(DOCS_SITE).unwrap();
        PipelineOrchestrator::for_site(&site, self.collaborators()).unwrap()
    }
}

pub(crate) fn trigger(revision: &str) -> TriggerEvent {
    TriggerEvent::new(
        RepositoryRef::new("acme", "docs-site", "main"),
        revision,
        TriggerSource::Webhook,
    )
    .with_actor("octocat")
}

pub(crate) fn push() -> TriggerEvent {
    trigger(REVISION)
}
