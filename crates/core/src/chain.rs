//! Provider tiers and the chain selection policy.
//!
//! [`select_chain`] turns the client's accelerated-mode preference and a
//! read-only view of the process-wide model state into the ordered list
//! of providers the orchestrator will attempt. The list always ends with
//! the deterministic resampling provider.

use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Resampling label when the client declined accelerated mode.
pub const LABEL_LANCZOS: &str = "lanczos";

/// Resampling label when accelerated mode was requested but models are still loading.
pub const LABEL_LANCZOS_LOADING: &str = "lanczos (model loading)";

/// Resampling label when accelerated mode was requested but nothing is available.
pub const LABEL_LANCZOS_UNAVAILABLE: &str = "lanczos (ml unavailable)";

/// Resampling label when it serves as the fallback after neural providers.
pub const LABEL_LANCZOS_FAILED: &str = "lanczos (ml failed)";

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// Provider variants, ranked best quality first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    /// Neural restoration through an external super-resolution process.
    Restoration,
    /// In-process diffusion upscaling.
    Diffusion,
    /// Deterministic resampling; infallible terminal fallback.
    Resampling,
}

impl ProviderTier {
    /// Neural tiers in preference order.
    pub const NEURAL: [ProviderTier; 2] = [ProviderTier::Restoration, ProviderTier::Diffusion];

    pub fn is_neural(self) -> bool {
        !matches!(self, ProviderTier::Resampling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderTier::Restoration => "restoration",
            ProviderTier::Diffusion => "diffusion",
            ProviderTier::Resampling => "resampling",
        }
    }
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load state of a provider tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Ready to serve requests.
    Loaded,
    /// Installed or configured, but not ready yet.
    Loadable,
    Unavailable,
}

/// One entry of a provider chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub tier: ProviderTier,
    pub availability: Availability,
    /// Method label reported in the `complete` event when this entry serves.
    pub label: String,
}

impl ProviderDescriptor {
    pub fn new(tier: ProviderTier, availability: Availability, label: impl Into<String>) -> Self {
        Self {
            tier,
            availability,
            label: label.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Availability view
// ---------------------------------------------------------------------------

/// Narrow read-only query interface over the process-wide model state.
pub trait AvailabilityView {
    fn availability(&self, tier: ProviderTier) -> Availability;

    /// Method label of a neural tier (e.g. which pipeline is loaded).
    fn label(&self, tier: ProviderTier) -> String;

    /// Whether the model-loading collaborator is currently running.
    fn is_loading(&self) -> bool;

    fn is_available(&self, tier: ProviderTier) -> bool {
        self.availability(tier) == Availability::Loaded
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Build the ordered provider chain for one request.
///
/// - Accelerated and at least one neural tier loaded: loaded neural tiers
///   best-first, then resampling labelled [`LABEL_LANCZOS_FAILED`].
/// - Otherwise: resampling alone, labelled by why it serves.
///
/// Never returns an empty chain and never fails.
pub fn select_chain(accelerated: bool, view: &dyn AvailabilityView) -> Vec<ProviderDescriptor> {
    let mut chain: Vec<ProviderDescriptor> = if accelerated {
        ProviderTier::NEURAL
            .into_iter()
            .filter(|tier| view.is_available(*tier))
            .map(|tier| ProviderDescriptor::new(tier, Availability::Loaded, view.label(tier)))
            .collect()
    } else {
        Vec::new()
    };

    let fallback_label = if !accelerated {
        LABEL_LANCZOS
    } else if !chain.is_empty() {
        LABEL_LANCZOS_FAILED
    } else if view.is_loading() {
        LABEL_LANCZOS_LOADING
    } else {
        LABEL_LANCZOS_UNAVAILABLE
    };

    chain.push(ProviderDescriptor::new(
        ProviderTier::Resampling,
        Availability::Loaded,
        fallback_label,
    ));
    chain
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
