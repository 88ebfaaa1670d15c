//! Deployment backends for edgeship.
//!
//! Provides:
//! - Object stores (local filesystem bucket, in-memory)
//! - The deploy action copying a build artifact into a store
//! - Static website serving rules
//! - Edge distributions (HTTP management API, in-memory)

pub mod deploy;
pub mod invalidation;
pub mod store;
pub mod website;

pub use deploy::{DeployReport, content_type_for, deploy_tree};
pub use edgeship_core::distribution::{EdgeDistribution, InvalidationReceipt, InvalidationRequest};
pub use edgeship_core::store::{ObjectStore, StoredObject, WebsiteConfig};
pub use invalidation::{HttpEdgeDistribution, MemoryDistribution};
pub use store::{FsObjectStore, MemoryObjectStore};
pub use website::{ServedObject, serve};
