//! Edge distribution (CDN) abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Path pattern covering every object behind a distribution.
pub const WILDCARD_PATH: &str = "/*";

/// A cache invalidation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRequest {
    pub distribution_id: String,
    pub paths: Vec<String>,
    /// Caller-supplied reference; the run id.
    pub caller_reference: String,
}

impl InvalidationRequest {
    /// Invalidate everything the distribution serves.
    pub fn wildcard(distribution_id: impl Into<String>, caller_reference: impl Into<String>) -> Self {
        Self {
            distribution_id: distribution_id.into(),
            paths: vec![WILDCARD_PATH.to_string()],
            caller_reference: caller_reference.into(),
        }
    }
}

/// Acknowledgement returned by the CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReceipt {
    /// Provider-assigned invalidation id.
    pub id: String,
    /// Provider status (e.g., "InProgress").
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Trait for edge distributions.
///
/// Duplicate invalidations for the same distribution are harmless, so
/// callers need no idempotency key beyond the distribution and paths.
#[async_trait]
pub trait EdgeDistribution: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// Ask the CDN to purge cached copies of `request.paths`.
    async fn create_invalidation(&self, request: &InvalidationRequest) -> Result<InvalidationReceipt>;
}
