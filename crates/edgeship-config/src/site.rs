//! Site configuration parsing.
//!
//! A site file (`edgeship.kdl`) names the repository branch to watch, how to
//! build it, which bucket receives the output and which edge distribution
//! fronts the bucket:
//!
//! ```kdl
//! site "docs" {
//!     domain "example.com"
//!     subdomain "docs"
//! }
//! source {
//!     owner "acme"
//!     repository "docs-site"
//!     branch "main"
//!     credential "github-connection"
//! }
//! build {
//!     run "npm ci"
//!     run "npm run build"
//!     output "public"
//! }
//! store "docs-site-bucket" {
//!     root "/srv/buckets/docs"
//! }
//! distribution "E2QWRUHAPOMQZL" {
//!     endpoint "https://cdn.example.com/api"
//! }
//! ```

use crate::nodes::{all_string_args, first_string_arg, required_string, seconds_arg, string_map};
use crate::runtime::{RuntimeConfig, parse_runtime};
use crate::{ConfigError, ConfigResult};
use edgeship_core::pipeline::{ActionKind, ActionSpec, DistributionBinding, Pipeline};
use edgeship_core::source::RepositoryRef;
use edgeship_core::store::WebsiteConfig;
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Default build time bound.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Default bound on the invalidation request.
pub const DEFAULT_INVALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

pub const SOURCE_STAGE: &str = "source";
pub const BUILD_STAGE: &str = "build";
pub const DEPLOY_STAGE: &str = "deploy";
pub const SOURCE_ARTIFACT: &str = "source_output";
pub const BUILD_ARTIFACT: &str = "build_output";

/// A fully parsed site definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site name; lower-cased, it prefixes the pipeline and action names.
    pub name: String,
    pub domain: String,
    pub subdomain: String,
    pub source: SourceConfig,
    pub build: BuildConfig,
    pub store: StoreConfig,
    pub distribution: DistributionConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub owner: String,
    pub repository: String,
    pub branch: String,
    /// Name of the credential used to read the repository.
    pub credential: String,
    /// Git host base URL.
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Shell commands run in order inside the checkout.
    pub commands: Vec<String>,
    /// Directory, relative to the checkout, holding the built site.
    pub output_dir: String,
    pub timeout: Duration,
    /// Extra build environment; values support `${...}` interpolation.
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    pub backend: StoreBackend,
    pub website: WebsiteConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackend {
    /// Directory on local disk acting as the bucket.
    Filesystem { root: PathBuf },
    /// Process memory; for dry runs.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub id: String,
    pub backend: DistributionBackend,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionBackend {
    /// CDN management API reached over HTTP.
    Http {
        endpoint: String,
        credential: Option<String>,
    },
    /// Records requests in memory; for dry runs.
    Memory,
}

/// Operator-visible outputs of a provisioned site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteOutputs {
    pub pipeline: String,
    pub bucket: String,
    pub distribution_id: String,
    pub site: String,
    pub base_url: String,
    /// Alias record `subdomain -> distribution`, for DNS tooling.
    pub alias_record: String,
}

impl SiteConfig {
    /// Lower-cased site name used in generated identifiers.
    pub fn prefix(&self) -> String {
        self.name.to_lowercase()
    }

    /// Host name the site is served under.
    pub fn host(&self) -> String {
        format!("{}.{}", self.subdomain, self.domain)
    }

    /// Deployed base URL handed to the build as `BASEURL`.
    pub fn base_url(&self) -> String {
        format!("https://{}/", self.host())
    }

    pub fn pipeline_name(&self) -> String {
        format!("{}-pipeline", self.prefix())
    }

    pub fn source_action(&self) -> String {
        format!("{}-sourceaction", self.prefix())
    }

    pub fn build_action(&self) -> String {
        format!("{}-buildaction", self.prefix())
    }

    pub fn deploy_action(&self) -> String {
        format!("{}-deployaction", self.prefix())
    }

    pub fn invalidate_action(&self) -> String {
        format!("{}-invalidate-action", self.prefix())
    }

    pub fn repository(&self) -> RepositoryRef {
        RepositoryRef::new(
            &self.source.owner,
            &self.source.repository,
            &self.source.branch,
        )
    }

    pub fn binding(&self) -> DistributionBinding {
        DistributionBinding {
            site: self.host(),
            distribution_id: self.distribution.id.clone(),
        }
    }

    /// The delivery topology: source, then build, then deploy alongside an
    /// invalidation that waits for the deploy to succeed.
    pub fn pipeline(&self) -> Pipeline {
        let deploy = self.deploy_action();
        Pipeline::new(self.pipeline_name())
            .stage(
                SOURCE_STAGE,
                vec![ActionSpec::new(self.source_action(), ActionKind::SourceFetch).with_output(SOURCE_ARTIFACT)],
            )
            .stage(
                BUILD_STAGE,
                vec![
                    ActionSpec::new(self.build_action(), ActionKind::Build)
                        .with_input(SOURCE_ARTIFACT)
                        .with_output(BUILD_ARTIFACT)
                        .with_timeout(self.build.timeout),
                ],
            )
            .stage(
                DEPLOY_STAGE,
                vec![
                    ActionSpec::new(deploy.clone(), ActionKind::Deploy).with_input(BUILD_ARTIFACT),
                    ActionSpec::new(self.invalidate_action(), ActionKind::Invoke)
                        .after(deploy)
                        .with_timeout(self.distribution.timeout),
                ],
            )
    }

    pub fn outputs(&self) -> SiteOutputs {
        SiteOutputs {
            pipeline: self.pipeline_name(),
            bucket: self.store.bucket.clone(),
            distribution_id: self.distribution.id.clone(),
            site: self.host(),
            base_url: self.base_url(),
            alias_record: format!("{} -> {}", self.subdomain, self.distribution.id),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        let base_url = url::Url::parse(&self.base_url())
            .map_err(|e| ConfigError::invalid("site", format!("invalid host '{}': {}", self.host(), e)))?;
        if base_url.host_str() != Some(self.host().as_str()) {
            return Err(ConfigError::invalid(
                "site",
                format!("'{}' is not a plain host name", self.host()),
            ));
        }

        url::Url::parse(&self.source.host)
            .map_err(|e| ConfigError::invalid("source host", e.to_string()))?;

        if let DistributionBackend::Http { endpoint, .. } = &self.distribution.backend {
            url::Url::parse(endpoint)
                .map_err(|e| ConfigError::invalid("distribution endpoint", e.to_string()))?;
        }

        let output = Path::new(&self.build.output_dir);
        let escapes = output.is_absolute()
            || output
                .components()
                .any(|c| matches!(c, Component::ParentDir));
        if escapes {
            return Err(ConfigError::invalid(
                "build output",
                "must be a path inside the checkout",
            ));
        }

        self.pipeline().validate()?;
        Ok(())
    }
}

/// Read and parse a site file.
pub fn load_site(path: impl AsRef<Path>) -> ConfigResult<SiteConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_site(&content)
}

/// Parse a site configuration from KDL text.
pub fn parse_site(kdl: &str) -> ConfigResult<SiteConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut site: Option<(String, String, String)> = None;
    let mut source = None;
    let mut build = None;
    let mut store = None;
    let mut distribution = None;
    let mut runtime = None;

    for node in doc.nodes() {
        let kind = node.name().value();
        match kind {
            "site" => set_once(&mut site, kind, parse_site_node(node)?)?,
            "source" => set_once(&mut source, kind, parse_source(node)?)?,
            "build" => set_once(&mut build, kind, parse_build(node)?)?,
            "store" => set_once(&mut store, kind, parse_store(node)?)?,
            "distribution" => set_once(&mut distribution, kind, parse_distribution(node)?)?,
            "runtime" => set_once(&mut runtime, kind, parse_runtime(node)?)?,
            _ => {} // Ignore unknown nodes
        }
    }

    let (name, domain, subdomain) =
        site.ok_or_else(|| ConfigError::MissingField("site".to_string()))?;

    let config = SiteConfig {
        name,
        domain,
        subdomain,
        source: source.ok_or_else(|| ConfigError::MissingField("source".to_string()))?,
        build: build.ok_or_else(|| ConfigError::MissingField("build".to_string()))?,
        store: store.ok_or_else(|| ConfigError::MissingField("store".to_string()))?,
        distribution: distribution
            .ok_or_else(|| ConfigError::MissingField("distribution".to_string()))?,
        runtime: runtime.unwrap_or_default(),
    };

    config.validate()?;
    Ok(config)
}

fn set_once<T>(slot: &mut Option<T>, kind: &str, value: T) -> ConfigResult<()> {
    if slot.is_some() {
        return Err(ConfigError::Duplicate(kind.to_string()));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_site_node(node: &KdlNode) -> ConfigResult<(String, String, String)> {
    let name = required_string(node, "site name")?;

    let mut domain = None;
    let mut subdomain = None;
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "domain" => domain = Some(required_string(child, "site domain")?),
                "subdomain" => subdomain = Some(required_string(child, "site subdomain")?),
                _ => {}
            }
        }
    }

    Ok((
        name,
        domain.ok_or_else(|| ConfigError::MissingField("site domain".to_string()))?,
        subdomain.ok_or_else(|| ConfigError::MissingField("site subdomain".to_string()))?,
    ))
}

fn parse_source(node: &KdlNode) -> ConfigResult<SourceConfig> {
    let mut owner = None;
    let mut repository = None;
    let mut branch = None;
    let mut credential = None;
    let mut host = "https://github.com".to_string();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "owner" => owner = Some(required_string(child, "source owner")?),
                "repository" => repository = Some(required_string(child, "source repository")?),
                "branch" => branch = Some(required_string(child, "source branch")?),
                "credential" => credential = Some(required_string(child, "source credential")?),
                "host" => host = required_string(child, "source host")?,
                _ => {}
            }
        }
    }

    Ok(SourceConfig {
        owner: owner.ok_or_else(|| ConfigError::MissingField("source owner".to_string()))?,
        repository: repository
            .ok_or_else(|| ConfigError::MissingField("source repository".to_string()))?,
        branch: branch.ok_or_else(|| ConfigError::MissingField("source branch".to_string()))?,
        credential: credential
            .ok_or_else(|| ConfigError::MissingField("source credential".to_string()))?,
        host: host.trim_end_matches('/').to_string(),
    })
}

fn parse_build(node: &KdlNode) -> ConfigResult<BuildConfig> {
    let mut commands = Vec::new();
    let mut output_dir = "public".to_string();
    let mut timeout = DEFAULT_BUILD_TIMEOUT;
    let mut env = BTreeMap::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "run" => commands.extend(all_string_args(child)),
                "output" => output_dir = required_string(child, "build output")?,
                "timeout-secs" => {
                    if let Some(t) = seconds_arg(child)? {
                        timeout = t;
                    }
                }
                "env" => env.extend(string_map(child)),
                _ => {}
            }
        }
    }

    if commands.is_empty() {
        return Err(ConfigError::MissingField("build run command".to_string()));
    }
    if timeout.is_zero() {
        return Err(ConfigError::invalid("build timeout-secs", "must be greater than zero"));
    }

    Ok(BuildConfig {
        commands,
        output_dir,
        timeout,
        env,
    })
}

fn parse_store(node: &KdlNode) -> ConfigResult<StoreConfig> {
    let bucket = required_string(node, "store bucket")?;

    let mut backend_kind = "filesystem".to_string();
    let mut root = None;
    let mut website = WebsiteConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "backend" => backend_kind = required_string(child, "store backend")?,
                "root" => root = first_string_arg(child).map(PathBuf::from),
                "index-document" => {
                    website.index_document = required_string(child, "store index-document")?
                }
                "error-document" => {
                    website.error_document = required_string(child, "store error-document")?
                }
                _ => {}
            }
        }
    }

    let backend = match backend_kind.as_str() {
        "filesystem" => StoreBackend::Filesystem {
            root: root.ok_or_else(|| ConfigError::MissingField("store root".to_string()))?,
        },
        "memory" => StoreBackend::Memory,
        other => {
            return Err(ConfigError::invalid(
                "store backend",
                format!("unknown backend: {}", other),
            ));
        }
    };

    Ok(StoreConfig {
        bucket,
        backend,
        website,
    })
}

fn parse_distribution(node: &KdlNode) -> ConfigResult<DistributionConfig> {
    let id = required_string(node, "distribution id")?;

    let mut backend_kind = "http".to_string();
    let mut endpoint = None;
    let mut credential = None;
    let mut timeout = DEFAULT_INVALIDATION_TIMEOUT;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "backend" => backend_kind = required_string(child, "distribution backend")?,
                "endpoint" => endpoint = Some(required_string(child, "distribution endpoint")?),
                "credential" => {
                    credential = Some(required_string(child, "distribution credential")?)
                }
                "timeout-secs" => {
                    if let Some(t) = seconds_arg(child)? {
                        timeout = t;
                    }
                }
                _ => {}
            }
        }
    }

    if timeout.is_zero() {
        return Err(ConfigError::invalid(
            "distribution timeout-secs",
            "must be greater than zero",
        ));
    }

    let backend = match backend_kind.as_str() {
        "http" => DistributionBackend::Http {
            endpoint: endpoint
                .ok_or_else(|| ConfigError::MissingField("distribution endpoint".to_string()))?
                .trim_end_matches('/')
                .to_string(),
            credential,
        },
        "memory" => DistributionBackend::Memory,
        other => {
            return Err(ConfigError::invalid(
                "distribution backend",
                format!("unknown backend: {}", other),
            ));
        }
    };

    Ok(DistributionConfig {
        id,
        backend,
        timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCS_SITE: &str = r#"
        site "Docs" {
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
            run "npm ci"
            run "npm run build"
            output "public"
            timeout-secs 900
            env {
                NODE_ENV "production"
            }
        }

        store "docs-site-bucket" {
            root "/srv/buckets/docs"
        }

        distribution "E2QWRUHAPOMQZL" {
            endpoint "https://cdn.example.com/api/"
            credential "cdn-token"
        }
    "#;

    #[test]
    fn test_parse_docs_site() {
        let site = parse_site(DOCS_SITE).unwrap();
        assert_eq!(site.name, "Docs");
        assert_eq!(site.host(), "docs.example.com");
        assert_eq!(site.base_url(), "https://docs.example.com/");
        assert_eq!(site.source.host, "https://github.com");
        assert_eq!(site.build.commands, vec!["npm ci", "npm run build"]);
        assert_eq!(site.build.timeout, Duration::from_secs(900));
        assert_eq!(site.build.env.get("NODE_ENV").map(String::as_str), Some("production"));
        assert_eq!(
            site.store.backend,
            StoreBackend::Filesystem {
                root: PathBuf::from("/srv/buckets/docs")
            }
        );
        assert_eq!(site.store.website.index_document, "index.html");
        assert_eq!(site.store.website.error_document, "error.html");
        assert_eq!(
            site.distribution.backend,
            DistributionBackend::Http {
                endpoint: "https://cdn.example.com/api".to_string(),
                credential: Some("cdn-token".to_string()),
            }
        );
        assert_eq!(site.distribution.timeout, DEFAULT_INVALIDATION_TIMEOUT);
    }

    #[test]
    fn test_generated_pipeline_topology() {
        let site = parse_site(DOCS_SITE).unwrap();
        let pipeline = site.pipeline();

        assert_eq!(pipeline.name, "docs-pipeline");
        let stages: Vec<&str> = pipeline.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(stages, vec!["source", "build", "deploy"]);

        let deploy_stage = &pipeline.stages[2];
        assert_eq!(deploy_stage.actions.len(), 2);
        assert_eq!(deploy_stage.actions[0].name, "docs-deployaction");
        assert_eq!(deploy_stage.actions[1].name, "docs-invalidate-action");
        assert_eq!(
            deploy_stage.actions[1].after.as_deref(),
            Some("docs-deployaction")
        );
        assert_eq!(
            deploy_stage.actions[1].timeout,
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_outputs() {
        let outputs = parse_site(DOCS_SITE).unwrap().outputs();
        assert_eq!(outputs.bucket, "docs-site-bucket");
        assert_eq!(outputs.distribution_id, "E2QWRUHAPOMQZL");
        assert_eq!(outputs.alias_record, "docs -> E2QWRUHAPOMQZL");
    }

    #[test]
    fn test_missing_source_block() {
        let kdl = r#"
            site "docs" {
                domain "example.com"
                subdomain "docs"
            }
            build { run "make" }
            store "b" { backend "memory" }
            distribution "E1" { backend "memory" }
        "#;
        let err = parse_site(kdl).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "source"));
    }

    #[test]
    fn test_duplicate_block_rejected() {
        let kdl = DOCS_SITE.to_string() + "\nstore \"other\" { backend \"memory\" }\n";
        assert!(matches!(
            parse_site(&kdl),
            Err(ConfigError::Duplicate(ref d)) if d == "store"
        ));
    }

    #[test]
    fn test_output_dir_must_stay_inside_checkout() {
        let kdl = DOCS_SITE.replace("output \"public\"", "output \"../elsewhere\"");
        assert!(matches!(
            parse_site(&kdl),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_filesystem_store_requires_root() {
        let kdl = DOCS_SITE.replace("root \"/srv/buckets/docs\"", "index-document \"home.html\"");
        assert!(matches!(
            parse_site(&kdl),
            Err(ConfigError::MissingField(ref f)) if f == "store root"
        ));
    }

    #[test]
    fn test_bad_subdomain_rejected() {
        let kdl = DOCS_SITE.replace("subdomain \"docs\"", "subdomain \"docs/evil\"");
        assert!(parse_site(&kdl).is_err());
    }
}
