//! Neural restoration through an external super-resolution executable.
//!
//! The executable is driven through files in a scoped temp directory:
//! `<binary> -i in.png -o out.png -s <scale> -n <model> [-m <models_dir>]`.
//! It reports progress on stderr as `NN.NN%` lines, which are translated
//! into [`ProgressEvent`]s with a total of 100.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

use image::DynamicImage;
use upscaler_core::chain::ProviderTier;
use upscaler_core::classify::{classify_failure, FailureKind};
use upscaler_core::progress::ProgressEvent;
use upscaler_core::request::UpscaleParams;

use crate::color;
use crate::error::ProviderError;
use crate::provider::UpscaleProvider;

/// Method label of the restoration tier.
pub const RESTORATION_LABEL: &str = "realesrgan";

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Scale factor the executable is asked for.
///
/// Models ship for 2x to 4x; anything else runs at 2x and is resampled
/// to the exact target afterwards.
pub fn native_scale(requested: u32) -> u32 {
    if (2..=4).contains(&requested) {
        requested
    } else {
        2
    }
}

/// Extract a percentage from a progress line such as `"37.50%"`.
pub fn parse_percent(line: &str) -> Option<f32> {
    let trimmed = line.trim();
    let number = trimmed.strip_suffix('%')?;
    let value: f32 = number.trim().parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

/// Provider backed by an external super-resolution process.
#[derive(Debug, Clone)]
pub struct RestorationProvider {
    binary: PathBuf,
    model: String,
    models_dir: Option<PathBuf>,
}

impl RestorationProvider {
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            models_dir: None,
        }
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(dir.into());
        self
    }

    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    fn run_process(
        &self,
        image: &DynamicImage,
        scale: u32,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<DynamicImage, ProviderError> {
        let workdir = tempfile::tempdir()?;
        let input_path = workdir.path().join("in.png");
        let output_path = workdir.path().join("out.png");
        image.to_rgb8().save(&input_path)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-i")
            .arg(&input_path)
            .arg("-o")
            .arg(&output_path)
            .arg("-s")
            .arg(scale.to_string())
            .arg("-n")
            .arg(&self.model);
        if let Some(dir) = &self.models_dir {
            cmd.arg("-m").arg(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        tracing::debug!(binary = %self.binary.display(), scale, model = %self.model, "Spawning restoration process");
        let mut child = ChildGuard(cmd.spawn()?);

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = child.0.stderr.take() {
            let mut reader = BufReader::new(stderr);
            let mut raw = Vec::new();
            // Device banners may carry non-UTF-8 bytes.
            while reader.read_until(b'\n', &mut raw)? > 0 {
                let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                raw.clear();
                if let Some(percent) = parse_percent(&line) {
                    on_progress(ProgressEvent::new(percent.floor() as u32, 100));
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = child.wait()?;
        let stderr = tail.into_iter().collect::<Vec<_>>().join("\n");

        if !status.success() {
            if classify_failure(&stderr) == FailureKind::ResourceExhausted {
                return Err(ProviderError::ResourceExhausted(stderr));
            }
            return Err(ProviderError::Subprocess {
                exit_code: status.code(),
                stderr,
            });
        }

        if !output_path.is_file() {
            return Err(ProviderError::InvalidOutput(format!(
                "upscaler exited successfully but wrote no output: {stderr}"
            )));
        }
        let output = image::open(&output_path)?;
        Ok(DynamicImage::ImageRgb8(output.into_rgb8()))
    }
}

/// Kills and reaps the child on every path that leaves it running,
/// including early returns and unwinding out of the progress callback.
struct ChildGuard(Child);

impl ChildGuard {
    fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.0.wait()
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            if let Err(e) = self.0.kill() {
                tracing::warn!(pid = self.0.id(), error = %e, "Failed to kill restoration process");
            }
            let _ = self.0.wait();
        }
    }
}

impl UpscaleProvider for RestorationProvider {
    fn tier(&self) -> ProviderTier {
        ProviderTier::Restoration
    }

    fn label(&self) -> String {
        RESTORATION_LABEL.to_string()
    }

    fn invoke(
        &self,
        image: &DynamicImage,
        params: &UpscaleParams,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<DynamicImage, ProviderError> {
        let scale = native_scale(params.scale);
        let output = self.run_process(image, scale, on_progress)?;
        Ok(color::apply(params.color_correction, output, image))
    }
}
