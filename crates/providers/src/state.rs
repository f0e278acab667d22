//! Process-wide model state.
//!
//! [`ModelState`] holds an immutable [`ModelSnapshot`] behind a short-lived
//! lock. Readers clone the current snapshot and query it without waiting
//! on loading work; the loader builds a new snapshot off-lock and swaps it
//! in. Only [`crate::loader::ModelLoader`] mutates the state.

use std::sync::{Arc, PoisonError, RwLock};

use upscaler_core::chain::{Availability, AvailabilityView, ProviderTier};

use crate::config::Device;
use crate::provider::{ProviderCatalog, UpscaleProvider};
use crate::resample::ResamplingProvider;

/// Point-in-time view of which providers are loaded.
#[derive(Clone, Default)]
pub struct ModelSnapshot {
    pub restoration: Option<Arc<dyn UpscaleProvider>>,
    pub diffusion: Option<Arc<dyn UpscaleProvider>>,
    /// A restoration binary is configured, whether or not it loaded.
    pub restoration_configured: bool,
    /// At least one diffusion pipeline loader is registered.
    pub diffusion_configured: bool,
    pub device: Device,
    pub loading: bool,
    /// Last loading error, if any.
    pub error: Option<String>,
}

impl std::fmt::Debug for ModelSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSnapshot")
            .field("restoration", &self.restoration.as_ref().map(|p| p.label()))
            .field("diffusion", &self.diffusion.as_ref().map(|p| p.label()))
            .field("device", &self.device)
            .field("loading", &self.loading)
            .field("error", &self.error)
            .finish()
    }
}

impl ModelSnapshot {
    /// Any neural tier is ready.
    pub fn any_loaded(&self) -> bool {
        self.restoration.is_some() || self.diffusion.is_some()
    }

    fn slot(&self, tier: ProviderTier) -> Option<&Arc<dyn UpscaleProvider>> {
        match tier {
            ProviderTier::Restoration => self.restoration.as_ref(),
            ProviderTier::Diffusion => self.diffusion.as_ref(),
            ProviderTier::Resampling => None,
        }
    }

    fn configured(&self, tier: ProviderTier) -> bool {
        match tier {
            ProviderTier::Restoration => self.restoration_configured,
            ProviderTier::Diffusion => self.diffusion_configured,
            ProviderTier::Resampling => true,
        }
    }
}

impl AvailabilityView for ModelSnapshot {
    fn availability(&self, tier: ProviderTier) -> Availability {
        if tier == ProviderTier::Resampling || self.slot(tier).is_some() {
            Availability::Loaded
        } else if self.configured(tier) && (self.loading || self.error.is_none()) {
            Availability::Loadable
        } else {
            Availability::Unavailable
        }
    }

    fn label(&self, tier: ProviderTier) -> String {
        match self.slot(tier) {
            Some(provider) => provider.label(),
            None => tier.as_str().to_string(),
        }
    }

    fn is_loading(&self) -> bool {
        self.loading
    }
}

impl ProviderCatalog for ModelSnapshot {
    fn provider(&self, tier: ProviderTier) -> Option<Arc<dyn UpscaleProvider>> {
        match tier {
            ProviderTier::Resampling => Some(Arc::new(ResamplingProvider)),
            _ => self.slot(tier).cloned(),
        }
    }
}

/// Owner of the current [`ModelSnapshot`].
#[derive(Debug, Default)]
pub struct ModelState {
    inner: RwLock<Arc<ModelSnapshot>>,
}

impl ModelState {
    pub fn new(device: Device) -> Self {
        Self::preloaded(ModelSnapshot {
            device,
            ..Default::default()
        })
    }

    /// State starting from an already-built snapshot.
    pub fn preloaded(snapshot: ModelSnapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The current snapshot. Never blocks on model loading.
    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the snapshot with `f(current)`.
    pub(crate) fn update(&self, f: impl FnOnce(&ModelSnapshot) -> ModelSnapshot) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(&guard);
        *guard = Arc::new(next);
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.update(|current| ModelSnapshot {
            loading,
            ..current.clone()
        });
    }

    /// Drop every loaded provider. Requests already holding a snapshot
    /// keep their providers alive until they finish.
    pub fn unload(&self) {
        self.update(|current| ModelSnapshot {
            restoration: None,
            diffusion: None,
            loading: false,
            ..current.clone()
        });
        tracing::info!("Model state unloaded");
    }
}
