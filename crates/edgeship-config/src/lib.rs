//! KDL configuration parsing for edgeship.
//!
//! This crate handles parsing of:
//! - Site definitions (edgeship.kdl)
//! - Runtime options
//! - Variable interpolation

mod nodes;

pub mod error;
pub mod runtime;
pub mod site;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use runtime::RuntimeConfig;
pub use site::{
    BuildConfig, DistributionBackend, DistributionConfig, SiteConfig, SiteOutputs, SourceConfig,
    StoreBackend, StoreConfig, load_site, parse_site,
};
pub use variables::VariableContext;
