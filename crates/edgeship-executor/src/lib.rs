//! Source and build backends for edgeship.
//!
//! Provides:
//! - A git source connector (shells out to `git`)
//! - A local build runner (runs build commands with `sh -c`)

pub mod git;
pub mod local;
pub mod workspace;

pub use edgeship_core::build::BuildRunner;
pub use edgeship_core::source::SourceConnector;
pub use git::GitSourceConnector;
pub use local::LocalBuildRunner;
