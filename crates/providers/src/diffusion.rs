//! In-process diffusion upscaling.
//!
//! Inference itself is a black box behind [`DiffusionPipeline`]. This
//! module owns everything around it: input size caps, step and guidance
//! schedules derived from the request, translating per-step callbacks
//! into [`ProgressEvent`]s with optional previews, and color correction.

use std::fmt;
use std::sync::Arc;

use image::imageops::FilterType;
use image::DynamicImage;
use upscaler_core::chain::ProviderTier;
use upscaler_core::progress::ProgressEvent;
use upscaler_core::request::UpscaleParams;

use crate::codec::encode_preview;
use crate::color;
use crate::config::Device;
use crate::error::ProviderError;
use crate::provider::UpscaleProvider;

// ---------------------------------------------------------------------------
// Pipeline contract
// ---------------------------------------------------------------------------

/// Which diffusion model a pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Text-guided 4x latent upscaler.
    SdUpscaler,
    /// Latent diffusion super-resolution.
    Ldsr,
}

impl PipelineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::SdUpscaler => "sd-x4-upscaler",
            PipelineKind::Ldsr => "ldsr",
        }
    }

    /// Method label reported when this pipeline serves a request.
    pub fn label(self) -> String {
        format!("ml ({})", self.as_str())
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inference knobs handed to a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffusionParams {
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub steps: u32,
    pub guidance_scale: f32,
    pub noise_level: u32,
    pub eta: Option<f32>,
}

/// Intermediate latents of a running pipeline, decodable on demand.
///
/// Decoding is expensive, so the provider only asks for it on preview steps.
pub trait LatentPreview {
    fn decode(&self) -> Result<DynamicImage, ProviderError>;
}

/// A loaded diffusion model.
pub trait DiffusionPipeline: Send + Sync {
    fn kind(&self) -> PipelineKind;

    fn device(&self) -> Device;

    /// Run inference. `on_step` is called with the zero-based step index
    /// after each denoising step.
    fn run(
        &self,
        input: &DynamicImage,
        params: &DiffusionParams,
        on_step: &mut dyn FnMut(u32, &dyn LatentPreview),
    ) -> Result<DynamicImage, ProviderError>;
}

/// Loads one kind of diffusion pipeline onto a device.
pub trait PipelineLoader: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, device: Device) -> Result<Arc<dyn DiffusionPipeline>, ProviderError>;
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

const SD_PROMPT: &str = "high quality, detailed, sharp, 4k resolution";
const SD_NEGATIVE_PROMPT: &str = "blurry, noise, artifacts, low quality, pixelated, jpeg artifacts";

/// Largest input edge a pipeline accepts on `device`.
pub fn max_input_edge(kind: PipelineKind, device: Device) -> u32 {
    match (kind, device) {
        (PipelineKind::SdUpscaler, Device::Mps) => 192,
        (PipelineKind::SdUpscaler, _) => 384,
        (PipelineKind::Ldsr, _) => 192,
    }
}

/// Derive inference parameters from the request.
pub fn diffusion_params(kind: PipelineKind, params: &UpscaleParams) -> DiffusionParams {
    match kind {
        PipelineKind::SdUpscaler => DiffusionParams {
            prompt: Some(SD_PROMPT.into()),
            negative_prompt: Some(SD_NEGATIVE_PROMPT.into()),
            steps: (20.0 + params.denoise * 30.0) as u32,
            guidance_scale: 7.5 + params.denoise * 2.0,
            noise_level: (params.creativity * 100.0).round() as u32,
            eta: None,
        },
        PipelineKind::Ldsr => DiffusionParams {
            prompt: None,
            negative_prompt: None,
            steps: (50.0 + params.denoise * 50.0) as u32,
            guidance_scale: 0.0,
            noise_level: 0,
            eta: Some(1.0),
        },
    }
}

/// Shrink `image` so neither edge exceeds `max_edge`, keeping aspect ratio.
pub fn cap_input(image: &DynamicImage, max_edge: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width <= max_edge && height <= max_edge {
        return image.clone();
    }
    let ratio = f64::min(
        f64::from(max_edge) / f64::from(width),
        f64::from(max_edge) / f64::from(height),
    );
    let new_width = ((f64::from(width) * ratio) as u32).max(1);
    let new_height = ((f64::from(height) * ratio) as u32).max(1);
    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Provider wrapping a loaded [`DiffusionPipeline`].
pub struct DiffusionProvider {
    pipeline: Arc<dyn DiffusionPipeline>,
}

impl DiffusionProvider {
    pub fn new(pipeline: Arc<dyn DiffusionPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn kind(&self) -> PipelineKind {
        self.pipeline.kind()
    }

    pub fn device(&self) -> Device {
        self.pipeline.device()
    }

    fn run_sd(
        &self,
        input: &DynamicImage,
        params: &DiffusionParams,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<DynamicImage, ProviderError> {
        let steps = params.steps.max(1);
        let previews = self.device() == Device::Cuda;
        let interval = (steps / 8).max(1);

        self.pipeline.run(input, params, &mut |step, latents| {
            let mut event = ProgressEvent::new(step + 1, steps);
            if previews && (step % interval == 0 || step + 1 == steps) {
                match latents.decode() {
                    Ok(image) => {
                        if let Some(preview) = encode_preview(&image) {
                            event = event.with_preview(preview);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, step, "Preview decode failed"),
                }
            }
            on_progress(event);
        })
    }

    fn run_ldsr(
        &self,
        input: &DynamicImage,
        params: &DiffusionParams,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<DynamicImage, ProviderError> {
        let steps = params.steps.max(1);
        let tenth = (steps / 10).max(1);

        let output = self.pipeline.run(input, params, &mut |step, _| {
            if step % tenth == 0 {
                on_progress(ProgressEvent::new(step, steps));
            }
        })?;
        on_progress(ProgressEvent::new(steps, steps));
        Ok(output)
    }
}

impl UpscaleProvider for DiffusionProvider {
    fn tier(&self) -> ProviderTier {
        ProviderTier::Diffusion
    }

    fn label(&self) -> String {
        self.kind().label()
    }

    fn invoke(
        &self,
        image: &DynamicImage,
        params: &UpscaleParams,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<DynamicImage, ProviderError> {
        let kind = self.kind();
        let input = cap_input(image, max_input_edge(kind, self.device()));
        let diffusion = diffusion_params(kind, params);

        tracing::info!(
            pipeline = %kind,
            input_width = input.width(),
            input_height = input.height(),
            scale = params.scale,
            steps = diffusion.steps,
            "Running diffusion upscale",
        );

        let output = match kind {
            PipelineKind::SdUpscaler => self.run_sd(&input, &diffusion, on_progress)?,
            PipelineKind::Ldsr => self.run_ldsr(&input, &diffusion, on_progress)?,
        };

        if output.width() == 0 || output.height() == 0 {
            return Err(ProviderError::InvalidOutput(
                "pipeline returned an empty image".into(),
            ));
        }
        Ok(color::apply(params.color_correction, output, image))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use image::{Rgb, RgbImage};

    use super::*;

    struct FlatLatents;

    impl LatentPreview for FlatLatents {
        fn decode(&self) -> Result<DynamicImage, ProviderError> {
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]))))
        }
    }

    /// Pipeline that upscales 4x with nearest-neighbour and records its input.
    struct FakePipeline {
        kind: PipelineKind,
        device: Device,
        fail: bool,
        seen_input: Mutex<Option<(u32, u32)>>,
    }

    impl FakePipeline {
        fn new(kind: PipelineKind, device: Device) -> Self {
            Self {
                kind,
                device,
                fail: false,
                seen_input: Mutex::new(None),
            }
        }
    }

    impl DiffusionPipeline for FakePipeline {
        fn kind(&self) -> PipelineKind {
            self.kind
        }

        fn device(&self) -> Device {
            self.device
        }

        fn run(
            &self,
            input: &DynamicImage,
            params: &DiffusionParams,
            on_step: &mut dyn FnMut(u32, &dyn LatentPreview),
        ) -> Result<DynamicImage, ProviderError> {
            *self.seen_input.lock().unwrap() = Some((input.width(), input.height()));
            if self.fail {
                return Err(ProviderError::ResourceExhausted("CUDA out of memory".into()));
            }
            for step in 0..params.steps {
                on_step(step, &FlatLatents);
            }
            Ok(input.resize_exact(input.width() * 4, input.height() * 4, FilterType::Nearest))
        }
    }

    fn image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([100, 50, 25])))
    }

    fn invoke(pipeline: FakePipeline, params: &UpscaleParams) -> (Vec<ProgressEvent>, DynamicImage) {
        let provider = DiffusionProvider::new(Arc::new(pipeline));
        let mut events = Vec::new();
        let out = provider
            .invoke(&image(8, 8), params, &mut |e| events.push(e))
            .unwrap();
        (events, out)
    }

    // -- schedules ------------------------------------------------------------

    #[test]
    fn sd_schedule_follows_denoise_and_creativity() {
        let params = UpscaleParams {
            denoise: 1.0,
            creativity: 0.25,
            ..Default::default()
        };
        let p = diffusion_params(PipelineKind::SdUpscaler, &params);
        assert_eq!(p.steps, 50);
        assert!((p.guidance_scale - 9.5).abs() < f32::EPSILON);
        assert_eq!(p.noise_level, 25);
        assert!(p.prompt.is_some());
    }

    #[test]
    fn ldsr_schedule() {
        let params = UpscaleParams {
            denoise: 0.0,
            ..Default::default()
        };
        let p = diffusion_params(PipelineKind::Ldsr, &params);
        assert_eq!(p.steps, 50);
        assert_eq!(p.eta, Some(1.0));
        assert!(p.prompt.is_none());
    }

    #[test]
    fn input_caps_depend_on_device() {
        assert_eq!(max_input_edge(PipelineKind::SdUpscaler, Device::Cuda), 384);
        assert_eq!(max_input_edge(PipelineKind::SdUpscaler, Device::Mps), 192);
        assert_eq!(max_input_edge(PipelineKind::Ldsr, Device::Cuda), 192);
    }

    #[test]
    fn cap_input_preserves_aspect() {
        let capped = cap_input(&image(800, 400), 384);
        assert_eq!((capped.width(), capped.height()), (384, 192));
        let untouched = cap_input(&image(100, 50), 384);
        assert_eq!((untouched.width(), untouched.height()), (100, 50));
    }

    #[test]
    fn labels() {
        assert_eq!(PipelineKind::SdUpscaler.label(), "ml (sd-x4-upscaler)");
        assert_eq!(PipelineKind::Ldsr.label(), "ml (ldsr)");
    }

    // -- provider -------------------------------------------------------------

    #[test]
    fn sd_on_cpu_reports_every_step_without_previews() {
        let params = UpscaleParams {
            denoise: 0.0,
            ..Default::default()
        };
        let (events, out) = invoke(FakePipeline::new(PipelineKind::SdUpscaler, Device::Cpu), &params);
        assert_eq!(events.len(), 20);
        assert_eq!(events.first().unwrap().step, 1);
        assert_eq!(events.last().unwrap().step, 20);
        assert!(events.iter().all(|e| e.preview.is_none()));
        assert_eq!((out.width(), out.height()), (32, 32));
    }

    #[test]
    fn sd_on_cuda_attaches_periodic_previews() {
        let params = UpscaleParams {
            denoise: 0.0,
            ..Default::default()
        };
        let (events, _) = invoke(FakePipeline::new(PipelineKind::SdUpscaler, Device::Cuda), &params);
        // 20 steps, interval 2: steps 0,2,...,18 plus the last (19).
        let with_preview = events.iter().filter(|e| e.preview.is_some()).count();
        assert_eq!(with_preview, 11);
        assert!(events.last().unwrap().preview.is_some());
    }

    #[test]
    fn ldsr_reports_tenths_and_final_step() {
        let params = UpscaleParams {
            denoise: 0.0,
            ..Default::default()
        };
        let (events, _) = invoke(FakePipeline::new(PipelineKind::Ldsr, Device::Cuda), &params);
        let steps: Vec<u32> = events.iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50]);
        assert!(events.iter().all(|e| e.total == 50));
    }

    #[test]
    fn large_input_is_capped_before_inference() {
        let pipeline = Arc::new(FakePipeline::new(PipelineKind::SdUpscaler, Device::Mps));
        let provider = DiffusionProvider::new(pipeline.clone());
        provider
            .invoke(&image(400, 200), &UpscaleParams::default(), &mut |_| {})
            .unwrap();
        assert_eq!(*pipeline.seen_input.lock().unwrap(), Some((192, 96)));
    }

    #[test]
    fn pipeline_errors_propagate() {
        let pipeline = FakePipeline {
            fail: true,
            ..FakePipeline::new(PipelineKind::SdUpscaler, Device::Cuda)
        };
        let provider = DiffusionProvider::new(Arc::new(pipeline));
        let result = provider.invoke(&image(8, 8), &UpscaleParams::default(), &mut |_| {});
        assert_matches!(result, Err(ProviderError::ResourceExhausted(_)));
    }
}
