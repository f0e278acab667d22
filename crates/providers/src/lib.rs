//! Upscaling providers and the process-wide model state.
//!
//! A provider is a blocking capability: take an image and request
//! parameters, report progress through a callback, return the upscaled
//! image or an error. Three tiers exist:
//!
//! - [`restoration::RestorationProvider`]: external super-resolution process.
//! - [`diffusion::DiffusionProvider`]: in-process diffusion inference.
//! - [`resample::ResamplingProvider`]: deterministic Lanczos resampling.
//!
//! Which neural tiers are usable is tracked by [`state::ModelState`] and
//! mutated only by [`loader::ModelLoader`].

pub mod codec;
pub mod color;
pub mod config;
pub mod diffusion;
pub mod error;
pub mod loader;
pub mod provider;
pub mod resample;
pub mod restoration;
pub mod state;

pub use error::ProviderError;
pub use provider::{ProviderCatalog, UpscaleProvider};
