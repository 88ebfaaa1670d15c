//! Build runner abstraction.

use async_trait::async_trait;

use crate::Result;
use crate::artifact::{Artifact, ArtifactTree};
use crate::context::ExecutionContext;

/// Trait for build runners.
///
/// The runner receives the source artifact unmodified and the run's
/// execution context, and returns the self-contained output tree.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Name of this runner.
    fn name(&self) -> &'static str;

    /// Build the site from a source artifact.
    async fn build(&self, source: &Artifact, ctx: &ExecutionContext) -> Result<ArtifactTree>;
}
