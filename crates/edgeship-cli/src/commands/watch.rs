//! Long-running local delivery: poll the branch, deploy each new revision.

use anyhow::{Context, Result};
use edgeship_core::secret::EnvCredentialProvider;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{load_site, status_label};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

pub async fn watch(config_path: &Path, interval_secs: Option<u64>, dry_run: bool) -> Result<()> {
    let mut site = load_site(config_path)?;
    let interval = interval_secs
        .map(Duration::from_secs)
        .or(site.runtime.poll_interval)
        .unwrap_or(DEFAULT_INTERVAL);
    if interval.is_zero() {
        anyhow::bail!("Poll interval must be greater than zero");
    }
    site.runtime.poll_interval = Some(interval);

    let credentials = Arc::new(EnvCredentialProvider::default());
    let collaborators = edgeship_api::bootstrap::collaborators(&site, credentials, dry_run)?;
    let scheduler = edgeship_api::bootstrap::start_scheduler(&site, collaborators.clone()).await?;
    let poller = edgeship_api::bootstrap::spawn_poller(&site, &collaborators, scheduler.clone())
        .context("Poller did not start")?;

    println!(
        "Watching {} ({}) every {}s. Press Ctrl-C to stop.",
        site.repository().full_name(),
        site.source.branch,
        interval.as_secs()
    );

    tokio::select! {
        _ = poller => anyhow::bail!("Poller stopped unexpectedly"),
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl-C")?,
    }

    let runs = scheduler.list(None, site.runtime.history_limit).await;
    println!("\n--- {} run(s) this session ---", runs.len());
    for run in runs.iter().rev() {
        println!(
            "  {} {} - {}",
            run.run_id,
            run.trigger.short_revision(),
            status_label(&run.status)
        );
    }
    Ok(())
}
