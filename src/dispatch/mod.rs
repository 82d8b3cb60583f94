//! Dispatch pipeline: bounded job queue plus the dispatcher task pool
//! forwarding jobs to runners selected round-robin over the alive subset.

mod engine;
mod queue;

pub use engine::DispatchEngine;
pub use queue::JobQueue;
