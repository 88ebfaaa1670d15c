//! Local pipeline execution command.

use anyhow::{Context, Result};
use edgeship_core::secret::EnvCredentialProvider;
use edgeship_core::source::{TriggerEvent, TriggerSource};
use edgeship_scheduler::{PipelineEvent, PipelineOrchestrator};
use std::path::Path;
use std::sync::Arc;

use super::{action_label, load_site, print_summary, status_label};

/// Run the site's pipeline once in this process.
pub async fn run_local(config_path: &Path, revision: Option<String>, dry_run: bool) -> Result<()> {
    let site = load_site(config_path)?;
    let credentials = Arc::new(EnvCredentialProvider::default());
    let collaborators = edgeship_api::bootstrap::collaborators(&site, credentials, dry_run)?;

    let repository = site.repository();
    let revision = match revision {
        Some(revision) => revision,
        None => collaborators
            .source
            .latest_revision(&repository)
            .await
            .with_context(|| format!("Failed to resolve head of {}", repository.branch))?,
    };

    let orchestrator = PipelineOrchestrator::for_site(&site, collaborators)?;
    println!("Running pipeline: {}", orchestrator.name());
    println!("Site: {}", site.base_url());
    if dry_run {
        println!("Dry run: deploying to in-memory store and distribution");
    }

    let mut trigger = TriggerEvent::new(repository, &revision, TriggerSource::Manual);
    if let Ok(user) = std::env::var("USER") {
        trigger = trigger.with_actor(user);
    }

    println!("\n--- Starting pipeline execution ---\n");
    let (mut rx, result_handle) = orchestrator.execute(trigger);

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::RunStarted { run_id, revision, .. } => {
                println!("Run {} at {}", run_id, revision.get(..7).unwrap_or(&revision));
            }
            PipelineEvent::StageStarted { stage } => {
                println!("▶ Stage '{}' started", stage);
            }
            PipelineEvent::ActionStarted { action, .. } => {
                println!("  ▶ {}", action);
            }
            PipelineEvent::ActionCompleted { action, status, .. } => {
                println!("  {} {}", action, action_label(&status));
            }
            PipelineEvent::StageCompleted { stage, success } => {
                if success {
                    println!("✓ Stage '{}' completed successfully\n", stage);
                } else {
                    println!("✗ Stage '{}' failed\n", stage);
                }
            }
            PipelineEvent::RunCompleted { status } => {
                println!("--- Pipeline {} ---", status_label(&status));
            }
        }
    }

    let result = result_handle
        .await
        .context("Pipeline execution task failed")?;
    print_summary(&result);

    if result.is_success() {
        println!("\n✓ Pipeline succeeded!");
        Ok(())
    } else {
        anyhow::bail!("Pipeline {}", status_label(&result.status));
    }
}
