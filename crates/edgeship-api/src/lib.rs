//! HTTP server for edgeship.
//!
//! Receives GitHub push webhooks, exposes run inspection and cancellation,
//! and reports the operator outputs of the configured site.

pub mod bootstrap;
pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
