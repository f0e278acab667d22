//! Domain types for the upscaling service.
//!
//! Everything here is runtime-free: request validation, progress and
//! outcome values, the client-facing stream events, provider tiers and
//! the chain selection policy. Provider implementations and the async
//! orchestration live in the `providers` and `pipeline` crates.

pub mod chain;
pub mod classify;
pub mod error;
pub mod events;
pub mod outcome;
pub mod progress;
pub mod request;
pub mod types;
