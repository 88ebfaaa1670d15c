//! Local build runner.
//!
//! Materialises the source artifact into a scratch directory, runs the
//! configured commands there with the run's environment, and collects the
//! output directory as the build artifact.

use async_trait::async_trait;
use edgeship_config::{SiteConfig, VariableContext};
use edgeship_core::artifact::{Artifact, ArtifactTree};
use edgeship_core::build::BuildRunner;
use edgeship_core::context::ExecutionContext;
use edgeship_core::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::workspace::{read_tree, write_tree};

/// Bytes of stderr kept in a build error.
const STDERR_TAIL: usize = 2048;

/// Runs build commands with `sh -c` on the local machine.
pub struct LocalBuildRunner {
    /// Site whose build section is run; also supplies `${site.*}` and `${git.*}`.
    site: SiteConfig,
    timeout: Duration,
    work_dir: PathBuf,
}

impl LocalBuildRunner {
    pub fn new(site: &SiteConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            site: site.clone(),
            timeout: site.build.timeout,
            work_dir: work_dir.into(),
        }
    }

    async fn run_command(
        &self,
        command: &str,
        dir: &std::path::Path,
        ctx: &ExecutionContext,
        deadline: Instant,
    ) -> Result<()> {
        info!(run_id = %ctx.run_id, command = %command, "Running build command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .envs(&ctx.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::build(format!("failed to start `{}`: {}", command, e)))?;

        let output = tokio::time::timeout_at(deadline, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(run_id = %ctx.run_id, command = %command, "Build timed out");
                Error::Timeout(format!(
                    "build exceeded {}s during `{}`",
                    self.timeout.as_secs(),
                    command
                ))
            })??;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(run_id = %ctx.run_id, "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = tail(stderr.trim(), STDERR_TAIL);
            let code = output.status.code();
            return Err(Error::Build {
                message: match code {
                    Some(code) => format!("`{}` exited with status {}: {}", command, code, tail),
                    None => format!("`{}` was terminated by a signal: {}", command, tail),
                },
                exit_code: code,
            });
        }

        Ok(())
    }
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[async_trait]
impl BuildRunner for LocalBuildRunner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn build(&self, source: &Artifact, ctx: &ExecutionContext) -> Result<ArtifactTree> {
        let deadline = Instant::now() + self.timeout;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("build-{}-", ctx.run_id.short()))
            .tempdir_in(&self.work_dir)?;
        write_tree(scratch.path(), &source.tree).await?;

        let vars = VariableContext::for_run(&self.site, ctx);
        for command in vars.interpolate_vec(&self.site.build.commands) {
            self.run_command(&command, scratch.path(), ctx, deadline).await?;
        }

        let output_dir = &self.site.build.output_dir;
        let output = scratch.path().join(output_dir);
        if !tokio::fs::metadata(&output).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::build(format!(
                "output directory '{}' was not produced",
                output_dir
            )));
        }

        let tree = read_tree(&output).await?;
        info!(
            run_id = %ctx.run_id,
            files = tree.len(),
            bytes = tree.size(),
            "Build output collected"
        );
        Ok(tree)
    }
}
