//! Model-loading collaborator, the single writer of [`ModelState`].
//!
//! Loading runs on a blocking worker. A tokio mutex used as a gate keeps
//! at most one load in flight; concurrent triggers observe
//! [`LoadStatus::AlreadyLoading`] instead of queueing behind it.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{Device, ProviderConfig};
use crate::diffusion::{DiffusionProvider, PipelineLoader};
use crate::provider::UpscaleProvider;
use crate::restoration::RestorationProvider;
use crate::state::{ModelSnapshot, ModelState};

/// Result of asking the loader to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Started,
    AlreadyLoaded,
    AlreadyLoading,
}

impl LoadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadStatus::Started => "started",
            LoadStatus::AlreadyLoaded => "already_loaded",
            LoadStatus::AlreadyLoading => "loading",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            LoadStatus::Started => "Model loading started",
            LoadStatus::AlreadyLoaded => "Model is already loaded",
            LoadStatus::AlreadyLoading => "Model is currently loading",
        }
    }
}

/// Providers produced by one loading pass.
struct Loaded {
    restoration: Option<Arc<dyn UpscaleProvider>>,
    diffusion: Option<Arc<dyn UpscaleProvider>>,
    device: Device,
    error: Option<String>,
}

pub struct ModelLoader {
    state: Arc<ModelState>,
    config: ProviderConfig,
    pipelines: Vec<Arc<dyn PipelineLoader>>,
    gate: Arc<Mutex<()>>,
}

impl ModelLoader {
    pub fn new(state: Arc<ModelState>, config: ProviderConfig) -> Self {
        let restoration_configured = config.restoration_binary.is_some();
        state.update(|current| ModelSnapshot {
            restoration_configured,
            device: config.device,
            ..current.clone()
        });
        Self {
            state,
            config,
            pipelines: Vec::new(),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Register a diffusion pipeline loader. Loaders are tried in
    /// registration order and the first one that succeeds is kept.
    pub fn with_pipeline(mut self, loader: impl PipelineLoader + 'static) -> Self {
        self.pipelines.push(Arc::new(loader));
        self.state.update(|current| ModelSnapshot {
            diffusion_configured: true,
            ..current.clone()
        });
        self
    }

    pub fn state(&self) -> &Arc<ModelState> {
        &self.state
    }

    /// Start loading in the background and return immediately.
    pub fn trigger(self: &Arc<Self>) -> LoadStatus {
        if self.state.snapshot().any_loaded() {
            return LoadStatus::AlreadyLoaded;
        }
        let Ok(guard) = Arc::clone(&self.gate).try_lock_owned() else {
            return LoadStatus::AlreadyLoading;
        };
        self.state.set_loading(true);

        let loader = Arc::clone(self);
        tokio::spawn(async move {
            loader.run().await;
            drop(guard);
        });
        LoadStatus::Started
    }

    /// Load and wait for completion.
    pub async fn load_now(&self) -> LoadStatus {
        if self.state.snapshot().any_loaded() {
            return LoadStatus::AlreadyLoaded;
        }
        let Ok(_guard) = Arc::clone(&self.gate).try_lock_owned() else {
            return LoadStatus::AlreadyLoading;
        };
        self.state.set_loading(true);
        self.run().await;
        LoadStatus::Started
    }

    async fn run(&self) {
        tracing::info!(device = %self.config.device, "Loading upscaling models");
        let config = self.config.clone();
        let pipelines = self.pipelines.clone();

        match tokio::task::spawn_blocking(move || load_models(&config, &pipelines)).await {
            Ok(loaded) => {
                tracing::info!(
                    restoration = loaded.restoration.is_some(),
                    diffusion = loaded.diffusion.is_some(),
                    device = %loaded.device,
                    error = loaded.error.as_deref(),
                    "Model loading finished",
                );
                self.state.update(|current| ModelSnapshot {
                    restoration: loaded.restoration,
                    diffusion: loaded.diffusion,
                    device: loaded.device,
                    loading: false,
                    error: loaded.error,
                    ..current.clone()
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Model loader task failed");
                self.state.update(|current| ModelSnapshot {
                    loading: false,
                    error: Some(format!("Model loader failed: {e}")),
                    ..current.clone()
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Blocking loading pass
// ---------------------------------------------------------------------------

fn load_models(config: &ProviderConfig, pipelines: &[Arc<dyn PipelineLoader>]) -> Loaded {
    let mut errors = Vec::new();

    let restoration = config.restoration_binary.as_deref().and_then(|binary| {
        match check_executable(binary) {
            Ok(()) => {
                let mut provider =
                    RestorationProvider::new(binary, config.restoration_model.clone());
                if let Some(dir) = &config.restoration_models_dir {
                    provider = provider.with_models_dir(dir);
                }
                tracing::info!(binary = %binary.display(), "Restoration upscaler available");
                Some(Arc::new(provider) as Arc<dyn UpscaleProvider>)
            }
            Err(e) => {
                tracing::warn!(binary = %binary.display(), error = %e, "Restoration upscaler unavailable");
                errors.push(e);
                None
            }
        }
    });

    let mut device = config.device;
    let mut diffusion: Option<Arc<dyn UpscaleProvider>> = None;
    let mut failures = Vec::new();
    for loader in pipelines {
        match loader.load(config.device) {
            Ok(pipeline) => {
                tracing::info!(pipeline = %pipeline.kind(), device = %pipeline.device(), "Diffusion pipeline loaded");
                device = pipeline.device();
                diffusion = Some(Arc::new(DiffusionProvider::new(pipeline)));
                break;
            }
            Err(e) => {
                tracing::warn!(pipeline = loader.name(), error = %e, "Diffusion pipeline failed to load");
                failures.push(format!("{}: {e}", loader.name()));
            }
        }
    }
    if diffusion.is_none() && !failures.is_empty() {
        errors.push(format!(
            "All diffusion pipelines failed: {}",
            failures.join("; ")
        ));
    }

    Loaded {
        restoration,
        diffusion,
        device,
        error: (!errors.is_empty()).then(|| errors.join("; ")),
    }
}

fn check_executable(path: &Path) -> Result<(), String> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| format!("Upscaler binary {} not found: {e}", path.display()))?;
    if !metadata.is_file() {
        return Err(format!("Upscaler binary {} is not a file", path.display()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(format!("Upscaler binary {} is not executable", path.display()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use image::DynamicImage;
    use upscaler_core::chain::{Availability, AvailabilityView, ProviderTier};

    use super::*;
    use crate::diffusion::{DiffusionParams, DiffusionPipeline, LatentPreview, PipelineKind};
    use crate::error::ProviderError;

    struct StubPipeline(PipelineKind);

    impl DiffusionPipeline for StubPipeline {
        fn kind(&self) -> PipelineKind {
            self.0
        }

        fn device(&self) -> Device {
            Device::Cuda
        }

        fn run(
            &self,
            input: &DynamicImage,
            _params: &DiffusionParams,
            _on_step: &mut dyn FnMut(u32, &dyn LatentPreview),
        ) -> Result<DynamicImage, ProviderError> {
            Ok(input.clone())
        }
    }

    struct StubLoader {
        kind: PipelineKind,
        fail: bool,
        delay: Duration,
    }

    impl StubLoader {
        fn ok(kind: PipelineKind) -> Self {
            Self {
                kind,
                fail: false,
                delay: Duration::ZERO,
            }
        }

        fn failing(kind: PipelineKind) -> Self {
            Self {
                fail: true,
                ..Self::ok(kind)
            }
        }
    }

    impl PipelineLoader for StubLoader {
        fn name(&self) -> &str {
            self.kind.as_str()
        }

        fn load(&self, _device: Device) -> Result<Arc<dyn DiffusionPipeline>, ProviderError> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(ProviderError::Inference("weights missing".into()));
            }
            Ok(Arc::new(StubPipeline(self.kind)))
        }
    }

    fn loader(config: ProviderConfig) -> ModelLoader {
        ModelLoader::new(Arc::new(ModelState::new(config.device)), config)
    }

    #[tokio::test]
    async fn nothing_configured_loads_nothing() {
        let loader = loader(ProviderConfig::default());
        assert_eq!(loader.load_now().await, LoadStatus::Started);
        let snapshot = loader.state().snapshot();
        assert!(!snapshot.any_loaded());
        assert!(!snapshot.is_loading());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn executable_binary_enables_restoration() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("upscaler");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let loader = loader(ProviderConfig {
            restoration_binary: Some(binary),
            ..Default::default()
        });
        assert_eq!(
            loader.state().snapshot().availability(ProviderTier::Restoration),
            Availability::Loadable
        );
        loader.load_now().await;
        let snapshot = loader.state().snapshot();
        assert!(snapshot.is_available(ProviderTier::Restoration));
        assert_eq!(loader.load_now().await, LoadStatus::AlreadyLoaded);
    }

    #[tokio::test]
    async fn non_executable_binary_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("upscaler");
        std::fs::write(&binary, "data").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();

        let loader = loader(ProviderConfig {
            restoration_binary: Some(binary),
            ..Default::default()
        });
        loader.load_now().await;
        let snapshot = loader.state().snapshot();
        assert_eq!(snapshot.availability(ProviderTier::Restoration), Availability::Unavailable);
        assert!(snapshot.error.as_deref().unwrap().contains("not executable"));
    }

    #[tokio::test]
    async fn second_pipeline_used_when_first_fails() {
        let loader = loader(ProviderConfig::default())
            .with_pipeline(StubLoader::failing(PipelineKind::SdUpscaler))
            .with_pipeline(StubLoader::ok(PipelineKind::Ldsr));
        loader.load_now().await;
        let snapshot = loader.state().snapshot();
        assert_eq!(snapshot.label(ProviderTier::Diffusion), "ml (ldsr)");
        assert_eq!(snapshot.device, Device::Cuda);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn all_pipelines_failing_is_reported() {
        let loader = loader(ProviderConfig::default())
            .with_pipeline(StubLoader::failing(PipelineKind::SdUpscaler))
            .with_pipeline(StubLoader::failing(PipelineKind::Ldsr));
        loader.load_now().await;
        let error = loader.state().snapshot().error.clone().unwrap();
        assert!(error.starts_with("All diffusion pipelines failed:"));
        assert!(error.contains("ldsr"));
    }

    #[tokio::test]
    async fn concurrent_trigger_reports_already_loading() {
        let slow = StubLoader {
            delay: Duration::from_millis(200),
            ..StubLoader::ok(PipelineKind::SdUpscaler)
        };
        let loader = Arc::new(loader(ProviderConfig::default()).with_pipeline(slow));

        assert_eq!(loader.trigger(), LoadStatus::Started);
        assert!(loader.state().snapshot().is_loading());
        assert_eq!(loader.trigger(), LoadStatus::AlreadyLoading);

        for _ in 0..50 {
            if !loader.state().snapshot().is_loading() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(loader.state().snapshot().is_available(ProviderTier::Diffusion));
        assert_eq!(loader.trigger(), LoadStatus::AlreadyLoaded);
    }
}
