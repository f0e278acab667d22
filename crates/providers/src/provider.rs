use std::sync::Arc;

use image::DynamicImage;
use upscaler_core::chain::{AvailabilityView, ProviderTier};
use upscaler_core::progress::ProgressEvent;
use upscaler_core::request::UpscaleParams;

use crate::error::ProviderError;

/// The contract every provider variant satisfies.
///
/// `invoke` is blocking and may take many seconds. It must be called from a
/// blocking worker, never from an async task. `on_progress` may be called
/// zero or more times before `invoke` returns, always on the calling thread.
pub trait UpscaleProvider: Send + Sync {
    fn tier(&self) -> ProviderTier;

    /// Method label reported to the client when this provider serves.
    fn label(&self) -> String;

    /// Upscale `image` by `params.scale`.
    ///
    /// The returned image should be `image` dimensions times the scale, but
    /// providers with internal resolution limits may return something else;
    /// the caller resamples to the exact target.
    fn invoke(
        &self,
        image: &DynamicImage,
        params: &UpscaleParams,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<DynamicImage, ProviderError>;
}

/// Read-only access to the providers the model state currently holds.
pub trait ProviderCatalog: AvailabilityView + Send + Sync {
    /// Resolve a tier to its provider, if loaded.
    fn provider(&self, tier: ProviderTier) -> Option<Arc<dyn UpscaleProvider>>;
}
