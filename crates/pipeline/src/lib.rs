//! Orchestration of upscale jobs.
//!
//! - [`relay`]: bounded, non-blocking progress channel per provider attempt.
//! - [`executor`]: runs one blocking provider call on a worker thread.
//! - [`orchestrator`]: walks the provider chain and emits the client event stream.

pub mod executor;
pub mod orchestrator;
pub mod relay;

pub use orchestrator::{Orchestrator, OrchestratorConfig, RunOutcome};
