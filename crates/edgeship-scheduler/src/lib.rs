//! Run scheduling for edgeship.
//!
//! Executes pipelines stage by stage and serializes runs of the same
//! pipeline through a per-pipeline FIFO queue.

pub mod control;
pub mod history;
pub mod orchestrator;
pub mod poller;
pub mod queue;
pub mod worker;

#[cfg(test)]
mod testing;

pub use control::{RunControl, RunPhase};
pub use history::RunHistory;
pub use orchestrator::{Collaborators, PipelineEvent, PipelineOrchestrator};
pub use poller::BranchPoller;
pub use queue::{RunTicket, Scheduler};
pub use worker::Worker;
