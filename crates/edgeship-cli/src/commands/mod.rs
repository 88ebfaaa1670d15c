//! CLI command implementations.

pub mod run;
pub mod runs;
pub mod watch;

use anyhow::{Context, Result};
use edgeship_config::SiteConfig;
use edgeship_core::pipeline::ActionStatus;
use edgeship_core::run::{RunResult, RunStatus};
use std::path::Path;

pub(crate) fn load_site(path: &Path) -> Result<SiteConfig> {
    let mut site = edgeship_config::load_site(path)
        .with_context(|| format!("Failed to load site config: {}", path.display()))?;
    site.runtime.apply_env();
    Ok(site)
}

pub fn validate(path: &Path) -> Result<()> {
    let site = load_site(path)?;
    let pipeline = site.pipeline();
    pipeline.validate()?;

    println!("Configuration is valid");
    println!("  site:     {}", site.host());
    println!(
        "  source:   {} ({})",
        site.repository().full_name(),
        site.source.branch
    );
    println!("  pipeline: {}", pipeline.name);
    for stage in &pipeline.stages {
        let actions: Vec<String> = stage
            .actions
            .iter()
            .map(|a| format!("{} [{}]", a.name, a.kind))
            .collect();
        println!("    {} -> {}", stage.name, actions.join(", "));
    }
    Ok(())
}

pub fn outputs(path: &Path) -> Result<()> {
    let site = load_site(path)?;
    println!("{}", serde_json::to_string_pretty(&site.outputs())?);
    Ok(())
}

pub(crate) fn status_label(status: &RunStatus) -> String {
    match status {
        RunStatus::Queued => "○ queued".to_string(),
        RunStatus::Running => "▶ running".to_string(),
        RunStatus::Succeeded => "✓ succeeded".to_string(),
        RunStatus::Failed { stage, action } => format!("✗ failed in {}/{}", stage, action),
        RunStatus::Cancelled => "⊘ cancelled".to_string(),
    }
}

pub(crate) fn action_label(status: &ActionStatus) -> String {
    match status {
        ActionStatus::Pending => "○ pending".to_string(),
        ActionStatus::Running => "▶ running".to_string(),
        ActionStatus::Succeeded => "✓ succeeded".to_string(),
        ActionStatus::Failed { message } => format!("✗ failed: {}", message),
        ActionStatus::Skipped { reason } => format!("⊘ skipped: {}", reason),
    }
}

/// Print the per-action summary of a finished run.
pub(crate) fn print_summary(result: &RunResult) {
    println!("\n--- Action Summary ---");
    for record in &result.actions {
        println!(
            "  {}/{} - {}",
            record.stage,
            record.action,
            action_label(&record.status)
        );
    }
    if !result.deployed_objects.is_empty() {
        println!("\nDeployed {} object(s)", result.deployed_objects.len());
    }
    if let Some(failure) = &result.failure {
        println!(
            "\nFailure ({:?}) in {}/{}: {}",
            failure.kind, failure.stage, failure.action, failure.message
        );
    }
}
