//! Source connector abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::artifact::ArtifactTree;

/// Metadata key under which a source artifact records its revision.
pub const REVISION_METADATA: &str = "revision";

/// A watched repository branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
        }
    }

    /// "owner/name", as used by git hosting providers.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Webhook,
    Poll,
    Manual,
}

/// A request to run the pipeline for one source revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub repository: RepositoryRef,
    /// Commit SHA at trigger time.
    pub revision: String,
    pub source: TriggerSource,
    /// Who caused the trigger, if known.
    pub actor: Option<String>,
}

impl TriggerEvent {
    pub fn new(repository: RepositoryRef, revision: impl Into<String>, source: TriggerSource) -> Self {
        Self {
            repository,
            revision: revision.into(),
            source,
            actor: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn short_revision(&self) -> &str {
        self.revision.get(..7).unwrap_or(&self.revision)
    }
}

/// Trait for source connectors.
///
/// Implementations receive credentials at construction time; tokens never
/// appear in artifact content.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Name of this connector.
    fn name(&self) -> &'static str;

    /// Current head revision of the branch.
    async fn latest_revision(&self, repository: &RepositoryRef) -> Result<String>;

    /// Fetch the tree at exactly `revision`.
    ///
    /// Fetching the same revision twice must yield identical trees.
    async fn fetch(&self, repository: &RepositoryRef, revision: &str) -> Result<ArtifactTree>;
}
