//! Runtime options for the edgeship daemon and CLI.

use crate::nodes::{first_string_arg, first_u64_arg, seconds_arg};
use crate::{ConfigError, ConfigResult};
use kdl::KdlNode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Process-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How often to poll the source branch. `None` disables polling.
    pub poll_interval: Option<Duration>,
    /// Scratch space for source checkouts and builds.
    pub work_dir: PathBuf,
    /// Number of finished runs kept for inspection.
    pub history_limit: usize,
    /// Address the HTTP server listens on.
    pub bind: String,
    /// Environment variable holding the webhook signing secret.
    pub webhook_secret_env: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: None,
            work_dir: std::env::temp_dir().join("edgeship"),
            history_limit: 100,
            bind: "0.0.0.0:3000".to_string(),
            webhook_secret_env: "EDGESHIP_WEBHOOK_SECRET".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Apply `EDGESHIP_BIND` and `EDGESHIP_WORK_DIR` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("EDGESHIP_BIND") {
            self.bind = bind;
        }
        if let Ok(dir) = std::env::var("EDGESHIP_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
    }

    /// Resolve the webhook secret from the environment, if set.
    pub fn webhook_secret(&self) -> Option<String> {
        std::env::var(&self.webhook_secret_env)
            .ok()
            .filter(|s| !s.is_empty())
    }
}

/// Parse a `runtime { ... }` node.
pub(crate) fn parse_runtime(node: &KdlNode) -> ConfigResult<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "poll-interval-secs" => {
                    let interval = seconds_arg(child)?
                        .ok_or_else(|| ConfigError::MissingField("poll-interval-secs value".to_string()))?;
                    if interval.is_zero() {
                        return Err(ConfigError::invalid(
                            "poll-interval-secs",
                            "must be greater than zero",
                        ));
                    }
                    config.poll_interval = Some(interval);
                }
                "work-dir" => {
                    if let Some(dir) = first_string_arg(child) {
                        config.work_dir = PathBuf::from(dir);
                    }
                }
                "history-limit" => {
                    if let Some(limit) = first_u64_arg(child)? {
                        config.history_limit = usize::try_from(limit)
                            .map_err(|_| ConfigError::invalid("history-limit", "too large"))?;
                    }
                }
                "bind" => {
                    if let Some(bind) = first_string_arg(child) {
                        config.bind = bind;
                    }
                }
                "webhook-secret-env" => {
                    if let Some(var) = first_string_arg(child) {
                        config.webhook_secret_env = var;
                    }
                }
                _ => {}
            }
        }
    }

    Ok(config)
}
