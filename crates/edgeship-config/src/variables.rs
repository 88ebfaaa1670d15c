//! Variable interpolation for build commands and build environment values.
//!
//! Supports variables like:
//! - `${site.name}`, `${site.host}`, `${site.base_url}`
//! - `${git.sha}`, `${git.short_sha}`, `${git.branch}`, `${git.repository}`
//! - `${pipeline.name}`
//! - `${run.id}`
//! - `${env.VAR_NAME}` - value exported to the build
//!
//! Unknown variables, and known ones with no value for the run, are left
//! untouched. Credentials are not available for
//! interpolation.

use edgeship_core::context::{BASE_URL_ENV, ExecutionContext};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::site::SiteConfig;

/// All variables available for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub site: SiteVars,
    pub git: GitVars,
    pub pipeline_name: String,
    pub run_id: String,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct SiteVars {
    pub name: String,
    pub host: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct GitVars {
    pub sha: String,
    pub short_sha: String,
    pub branch: String,
    pub repository: String,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}")
        .expect("variable pattern is valid")
});

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables for a run: the run's context plus the site it deploys.
    pub fn for_run(site: &SiteConfig, ctx: &ExecutionContext) -> Self {
        let mut vars = Self::from_execution(ctx);
        vars.site = SiteVars {
            name: site.name.clone(),
            host: site.host(),
            base_url: site.base_url(),
        };
        vars.git.branch = site.source.branch.clone();
        vars.git.repository = format!("{}/{}", site.source.owner, site.source.repository);
        vars
    }

    /// Variables derivable from an execution context alone.
    pub fn from_execution(ctx: &ExecutionContext) -> Self {
        let mut vars = Self::new();
        vars.git.sha = ctx.revision.clone();
        vars.git.short_sha = ctx.revision.chars().take(7).collect();
        vars.pipeline_name = ctx.pipeline.clone();
        vars.run_id = ctx.run_id.to_string();
        vars.env = ctx
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(base_url) = ctx.env.get(BASE_URL_ENV) {
            vars.site.base_url = base_url.clone();
        }
        vars
    }

    /// Resolve a variable name to its value. Unset values resolve to `None`.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        let value = match parts.as_slice() {
            ["site", "name"] => &self.site.name,
            ["site", "host"] => &self.site.host,
            ["site", "base_url"] => &self.site.base_url,

            ["git", "sha"] => &self.git.sha,
            ["git", "short_sha"] => &self.git.short_sha,
            ["git", "branch"] => &self.git.branch,
            ["git", "repository"] => &self.git.repository,

            ["pipeline", "name"] => &self.pipeline_name,
            ["run", "id"] => &self.run_id,

            ["env", name] => return self.env.get(*name).cloned(),

            _ => return None,
        };
        (!value.is_empty()).then(|| value.clone())
    }

    /// Interpolate all `${...}` variables in a string.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn interpolate_vec(&self, inputs: &[String]) -> Vec<String> {
        inputs.iter().map(|s| self.interpolate(s)).collect()
    }

    pub fn interpolate_map(&self, map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.interpolate(v)))
            .collect()
    }
}
