//! Wiring of the concrete collaborators for a site.

use edgeship_config::{DistributionBackend, SiteConfig, StoreBackend};
use edgeship_core::Result;
use edgeship_core::distribution::EdgeDistribution;
use edgeship_core::secret::CredentialProvider;
use edgeship_core::store::ObjectStore;
use edgeship_deployer::{FsObjectStore, HttpEdgeDistribution, MemoryDistribution, MemoryObjectStore};
use edgeship_executor::{GitSourceConnector, LocalBuildRunner};
use edgeship_scheduler::{BranchPoller, Collaborators, PipelineOrchestrator, RunHistory, Scheduler};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Build the collaborators described by `site`.
///
/// With `dry_run`, the store and distribution are replaced by in-memory
/// backends so nothing outside the work directory is touched.
pub fn collaborators(
    site: &SiteConfig,
    credentials: Arc<dyn CredentialProvider>,
    dry_run: bool,
) -> Result<Collaborators> {
    let work_dir = &site.runtime.work_dir;

    let source = GitSourceConnector::new(&site.source.host, work_dir.join("checkouts"))
        .with_credentials(credentials.clone(), &site.source.credential);
    let builder = LocalBuildRunner::new(site, work_dir.join("builds"));

    let store: Arc<dyn ObjectStore> = match (&site.store.backend, dry_run) {
        (StoreBackend::Filesystem { root }, false) => {
            info!(bucket = %site.store.bucket, root = %root.display(), "Using filesystem store");
            Arc::new(FsObjectStore::new(&site.store.bucket, root))
        }
        _ => {
            info!(bucket = %site.store.bucket, "Using in-memory store");
            Arc::new(MemoryObjectStore::new(&site.store.bucket))
        }
    };

    let distribution: Arc<dyn EdgeDistribution> = match (&site.distribution.backend, dry_run) {
        (DistributionBackend::Http { endpoint, credential }, false) => {
            info!(distribution = %site.distribution.id, endpoint = %endpoint, "Using HTTP edge distribution");
            let http = HttpEdgeDistribution::new(endpoint, site.distribution.timeout)?;
            match credential {
                Some(name) => Arc::new(http.with_credentials(credentials, name)),
                None => Arc::new(http),
            }
        }
        _ => {
            info!(distribution = %site.distribution.id, "Using in-memory edge distribution");
            Arc::new(MemoryDistribution::new())
        }
    };

    Ok(Collaborators {
        source: Arc::new(source),
        builder: Arc::new(builder),
        store,
        distribution,
    })
}

/// Create the scheduler and register the site's pipeline.
pub async fn start_scheduler(site: &SiteConfig, collaborators: Collaborators) -> Result<Arc<Scheduler>> {
    let history = Arc::new(RunHistory::new(site.runtime.history_limit));
    let scheduler = Arc::new(Scheduler::new(history));
    let orchestrator = PipelineOrchestrator::for_site(site, collaborators)?;
    scheduler.register(orchestrator).await?;
    Ok(scheduler)
}

/// Spawn the branch poller if the site configures a poll interval.
pub fn spawn_poller(
    site: &SiteConfig,
    collaborators: &Collaborators,
    scheduler: Arc<Scheduler>,
) -> Option<JoinHandle<()>> {
    let interval = site.runtime.poll_interval?;
    let poller = BranchPoller::new(
        collaborators.source.clone(),
        scheduler,
        site.repository(),
        site.pipeline_name(),
        interval,
    );
    Some(tokio::spawn(poller.run()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeship_core::secret::StaticCredentials;

    fn site(kdl_backends: &str) -> SiteConfig {
        edgeship_config::parse_site(&format!(
            r#"
            site "docs" {{
                domain "example.com"
                subdomain "docs"
            }}
            source {{
                owner "acme"
                repository "docs-site"
                branch "main"
                credential "github-connection"
            }}
            build {{
                run "make site"
            }}
            {}
            "#,
            kdl_backends
        ))
        .unwrap()
    }

    #[test]
    fn test_dry_run_uses_memory_backends() {
        let site = site(
            r#"
            store "docs-site-bucket" {
                backend "filesystem"
                root "/var/lib/edgeship/bucket"
            }
            distribution "E2QWRUHAPOMQZL" {
                endpoint "https://cdn.example.net"
            }
            "#,
        );
        let collaborators = collaborators(&site, Arc::new(StaticCredentials::new()), true).unwrap();
        assert_eq!(collaborators.store.bucket(), "docs-site-bucket");
        assert_eq!(collaborators.source.name(), "git");
    }

    #[test]
    fn test_configured_backends() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(&format!(
            r#"
            store "docs-site-bucket" {{
                root "{}"
            }}
            distribution "E2QWRUHAPOMQZL" {{
                endpoint "https://cdn.example.net"
                credential "cdn-token"
            }}
            "#,
            dir.path().display()
        ));
        let collaborators = collaborators(&site, Arc::new(StaticCredentials::new()), false).unwrap();
        assert_eq!(collaborators.store.bucket(), "docs-site-bucket");
        assert_eq!(collaborators.builder.name(), "local");
    }

    #[tokio::test]
    async fn test_start_scheduler_registers_pipeline() {
        let site = site(
            r#"
            store "docs-site-bucket" {
                backend "memory"
            }
            distribution "E2QWRUHAPOMQZL" {
                backend "memory"
            }
            "#,
        );
        let collaborators = collaborators(&site, Arc::new(StaticCredentials::new()), false).unwrap();
        let scheduler = start_scheduler(&site, collaborators.clone()).await.unwrap();
        assert_eq!(scheduler.pipelines().await, vec!["docs-pipeline"]);

        // No poll interval configured.
        assert!(spawn_poller(&site, &collaborators, scheduler).is_none());
    }
}
