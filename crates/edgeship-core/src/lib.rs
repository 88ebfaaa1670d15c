//! Core domain types and traits for edgeship.
//!
//! This crate contains:
//! - Run identifiers and the error taxonomy
//! - Pipeline, stage and action definitions
//! - Artifacts and the per-run artifact registry
//! - The per-run execution context
//! - Collaborator traits (source, build, object store, edge distribution, secrets)

pub mod artifact;
pub mod build;
pub mod context;
pub mod distribution;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod run;
pub mod secret;
pub mod source;
pub mod store;

pub use error::{Error, FailureKind, Result};
pub use id::RunId;
