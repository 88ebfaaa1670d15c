//! Git source connector.
//!
//! Shells out to the `git` CLI. The access token is handed to git through
//! `GIT_CONFIG_*` environment variables as an HTTP header, so it appears
//! neither on the command line nor in the checked-out tree.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use edgeship_core::artifact::ArtifactTree;
use edgeship_core::secret::{CredentialProvider, SecretValue};
use edgeship_core::source::{RepositoryRef, SourceConnector};
use edgeship_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::workspace::read_tree;

/// Source connector backed by `git`.
pub struct GitSourceConnector {
    /// Base URL of the git host (e.g., "https://github.com").
    host: String,
    credentials: Option<(Arc<dyn CredentialProvider>, String)>,
    /// Parent directory for temporary checkouts.
    work_dir: PathBuf,
}

impl GitSourceConnector {
    pub fn new(host: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            credentials: None,
            work_dir: work_dir.into(),
        }
    }

    /// Authenticate with the credential named `name`, resolved per request.
    pub fn with_credentials(
        mut self,
        provider: Arc<dyn CredentialProvider>,
        name: impl Into<String>,
    ) -> Self {
        self.credentials = Some((provider, name.into()));
        self
    }

    pub fn remote_url(&self, repository: &RepositoryRef) -> String {
        format!(
            "{}/{}/{}.git",
            self.host, repository.owner, repository.name
        )
    }

    async fn resolve_token(&self) -> Result<Option<SecretValue>> {
        let Some((provider, name)) = &self.credentials else {
            return Ok(None);
        };
        provider
            .resolve(name)
            .await
            .map(Some)
            .map_err(|e| Error::Trigger(e.to_string()))
    }

    async fn git(&self, args: &[&str], cwd: Option<&Path>, token: Option<&SecretValue>) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        if let Some(token) = token {
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", auth_header(token));
        }

        debug!(args = ?args, "Running git");

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::Trigger(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = redact(stderr.trim(), token);
            return Err(Error::Trigger(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn auth_header(token: &SecretValue) -> String {
    let basic = STANDARD.encode(format!("x-access-token:{}", token.expose()));
    format!("Authorization: Basic {}", basic)
}

/// Strip any trace of the token from text that may be logged.
fn redact(text: &str, token: Option<&SecretValue>) -> String {
    match token {
        Some(token) if !token.expose().is_empty() => text
            .replace(&auth_header(token), "Authorization: ***")
            .replace(token.expose(), "***"),
        _ => text.to_string(),
    }
}

/// Only full or abbreviated hex object ids are accepted as revisions.
fn validate_revision(revision: &str) -> Result<()> {
    let valid = (7..=40).contains(&revision.len()) && revision.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(Error::Trigger(format!("invalid revision '{}'", revision)));
    }
    Ok(())
}

#[async_trait]
impl SourceConnector for GitSourceConnector {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn latest_revision(&self, repository: &RepositoryRef) -> Result<String> {
        let token = self.resolve_token().await?;
        let url = self.remote_url(repository);
        let head_ref = format!("refs/heads/{}", repository.branch);

        let output = self
            .git(&["ls-remote", "--", &url, &head_ref], None, token.as_ref())
            .await?;

        output
            .lines()
            .find_map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(sha), Some(r)) if r == head_ref => Some(sha.to_string()),
                    _ => None,
                }
            })
            .ok_or_else(|| {
                Error::Trigger(format!(
                    "branch '{}' not found in {}",
                    repository.branch,
                    repository.full_name()
                ))
            })
    }

    async fn fetch(&self, repository: &RepositoryRef, revision: &str) -> Result<ArtifactTree> {
        validate_revision(revision)?;
        let token = self.resolve_token().await?;
        let url = self.remote_url(repository);

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let checkout = tempfile::Builder::new()
            .prefix("source-")
            .tempdir_in(&self.work_dir)?;
        let dir = checkout.path();

        info!(repo = %repository.full_name(), revision = %revision, "Fetching source");

        self.git(&["init", "-q"], Some(dir), None).await?;

        // Shallow fetch of the exact commit; hosts that refuse unadvertised
        // object ids get a full fetch of the branch instead.
        let shallow = self
            .git(
                &["fetch", "-q", "--depth", "1", "--", &url, revision],
                Some(dir),
                token.as_ref(),
            )
            .await;
        if let Err(e) = shallow {
            warn!(error = %e, "Shallow fetch by revision failed, fetching branch");
            let branch_ref = format!("refs/heads/{}", repository.branch);
            self.git(&["fetch", "-q", "--", &url, &branch_ref], Some(dir), token.as_ref())
                .await?;
        }

        self.git(&["checkout", "-q", "--detach", revision], Some(dir), None)
            .await?;

        let head = self.git(&["rev-parse", "HEAD"], Some(dir), None).await?;
        if !head.starts_with(revision) {
            return Err(Error::Trigger(format!(
                "checked out {} but {} was requested",
                head, revision
            )));
        }

        read_tree(dir).await
    }
}
