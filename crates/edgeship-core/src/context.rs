//! Per-run execution context.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::RunId;

/// Environment key carrying the deployed base URL into the build.
pub const BASE_URL_ENV: &str = "BASEURL";

/// State created once per run and visible to the build runner.
///
/// Never holds credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub run_id: RunId,
    pub pipeline: String,
    /// Source revision being built.
    pub revision: String,
    /// Environment values exported to the build.
    pub env: BTreeMap<String, String>,
}

impl ExecutionContext {
    pub fn new(
        run_id: RunId,
        pipeline: impl Into<String>,
        revision: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let mut env = BTreeMap::new();
        env.insert(BASE_URL_ENV.to_string(), base_url.into());
        Self {
            run_id,
            pipeline: pipeline.into(),
            revision: revision.into(),
            env,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn base_url(&self) -> Option<&str> {
        self.env.get(BASE_URL_ENV).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_exported() {
        let ctx = ExecutionContext::new(RunId::new(), "docs-pipeline", "abc123", "https://docs.example.com/")
            .with_env("NODE_ENV", "production");
        assert_eq!(ctx.base_url(), Some("https://docs.example.com/"));
        assert_eq!(ctx.env.get("NODE_ENV").map(String::as_str), Some("production"));
    }
}
