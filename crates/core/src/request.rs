//! Upscale request values and ingress validation.
//!
//! A request is validated exactly once, when it is built from the client's
//! form fields. Everything downstream (chain selection, providers, the
//! orchestrator) receives an [`UpscaleRequest`] and may assume its
//! parameters are in range.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::ImageSize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest accepted scale factor.
pub const MIN_SCALE: u32 = 1;

/// Largest accepted scale factor.
pub const MAX_SCALE: u32 = 4;

/// Scale factor used when the client omits the field.
pub const DEFAULT_SCALE: u32 = 2;

/// Denoise strength used when the client omits the field.
pub const DEFAULT_DENOISE: f32 = 0.3;

/// Creativity used when the client omits the field.
pub const DEFAULT_CREATIVITY: f32 = 0.0;

// ---------------------------------------------------------------------------
// Color correction
// ---------------------------------------------------------------------------

/// Provider-specific color-correction mode applied to neural outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorCorrection {
    /// Leave the provider output untouched.
    #[default]
    None,
    /// Match per-channel mean and standard deviation to the source image.
    Adain,
    /// Replace the low-frequency band with the one of the resampled source.
    Wavelet,
}

impl ColorCorrection {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorCorrection::None => "none",
            ColorCorrection::Adain => "adain",
            ColorCorrection::Wavelet => "wavelet",
        }
    }
}

impl fmt::Display for ColorCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorCorrection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(ColorCorrection::None),
            "adain" => Ok(ColorCorrection::Adain),
            "wavelet" => Ok(ColorCorrection::Wavelet),
            other => Err(CoreError::Validation(format!(
                "color_correction must be one of none, adain, wavelet (got \"{other}\")"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Numeric and mode knobs of an upscale request.
#[derive(Debug, Clone, PartialEq, Validate, Serialize)]
pub struct UpscaleParams {
    #[validate(range(min = 1, max = 4, message = "scale must be between 1 and 4"))]
    pub scale: u32,

    #[validate(range(min = 0.0, max = 1.0, message = "denoise must be between 0.0 and 1.0"))]
    pub denoise: f32,

    #[validate(range(
        min = 0.0,
        max = 1.0,
        message = "creativity must be between 0.0 and 1.0"
    ))]
    pub creativity: f32,

    /// Client preference for the neural (accelerated) providers.
    pub accelerated: bool,

    pub color_correction: ColorCorrection,
}

impl Default for UpscaleParams {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            denoise: DEFAULT_DENOISE,
            creativity: DEFAULT_CREATIVITY,
            accelerated: true,
            color_correction: ColorCorrection::None,
        }
    }
}

impl UpscaleParams {
    /// Check every field against its allowed range.
    ///
    /// NaN passes a plain range comparison, so finiteness is checked
    /// separately before delegating to the derived validator.
    pub fn check(&self) -> Result<(), CoreError> {
        if !self.denoise.is_finite() {
            return Err(CoreError::Validation(
                "denoise must be a finite number".to_string(),
            ));
        }
        if !self.creativity.is_finite() {
            return Err(CoreError::Validation(
                "creativity must be a finite number".to_string(),
            ));
        }
        self.validate()?;
        Ok(())
    }
}

/// Target size of `source` at `scale`, rejected when it exceeds
/// `max_pixels`.
///
/// Checked at ingress, before the source is decoded, so an oversized
/// request never reaches a provider.
pub fn check_output_size(
    source: ImageSize,
    scale: u32,
    max_pixels: u64,
) -> Result<ImageSize, CoreError> {
    let target = source.scaled(scale);
    if target.pixels() > max_pixels {
        return Err(CoreError::Validation(format!(
            "output size {target} exceeds the limit of {max_pixels} pixels"
        )));
    }
    Ok(target)
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// An immutable, validated upscale request.
///
/// Cheap to clone: the source bytes are shared.
#[derive(Debug, Clone)]
pub struct UpscaleRequest {
    image: Arc<[u8]>,
    params: UpscaleParams,
}

impl UpscaleRequest {
    /// Build a request, rejecting empty images and out-of-range parameters.
    pub fn new(image: impl Into<Arc<[u8]>>, params: UpscaleParams) -> Result<Self, CoreError> {
        let image = image.into();
        if image.is_empty() {
            return Err(CoreError::Validation(
                "image must not be empty".to_string(),
            ));
        }
        params.check()?;
        Ok(Self { image, params })
    }

    /// Raw encoded source image as uploaded by the client.
    pub fn image_bytes(&self) -> &[u8] {
        &self.image
    }

    pub fn params(&self) -> &UpscaleParams {
        &self.params
    }

    pub fn scale(&self) -> u32 {
        self.params.scale
    }

    pub fn accelerated(&self) -> bool {
        self.params.accelerated
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn params(scale: u32, denoise: f32, creativity: f32) -> UpscaleParams {
        UpscaleParams {
            scale,
            denoise,
            creativity,
            ..Default::default()
        }
    }

    // -- UpscaleParams --------------------------------------------------------

    #[test]
    fn defaults_are_valid() {
        assert!(UpscaleParams::default().check().is_ok());
    }

    #[test]
    fn scale_bounds_are_inclusive() {
        assert!(params(MIN_SCALE, 0.0, 0.0).check().is_ok());
        assert!(params(MAX_SCALE, 1.0, 1.0).check().is_ok());
    }

    #[test]
    fn scale_zero_rejected() {
        assert_matches!(params(0, 0.3, 0.0).check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn scale_five_rejected() {
        let err = params(5, 0.3, 0.0).check().unwrap_err();
        assert!(err.to_string().contains("scale must be between 1 and 4"));
    }

    #[test]
    fn denoise_out_of_range_rejected() {
        assert_matches!(params(2, 1.5, 0.0).check(), Err(CoreError::Validation(_)));
        assert_matches!(params(2, -0.1, 0.0).check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn creativity_out_of_range_rejected() {
        assert_matches!(params(2, 0.3, 1.01).check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn nan_rejected() {
        assert_matches!(
            params(2, f32::NAN, 0.0).check(),
            Err(CoreError::Validation(msg)) if msg.contains("denoise")
        );
        assert_matches!(
            params(2, 0.3, f32::NAN).check(),
            Err(CoreError::Validation(msg)) if msg.contains("creativity")
        );
    }

    // -- ColorCorrection ------------------------------------------------------

    #[test]
    fn color_correction_parses_case_insensitively() {
        assert_eq!("AdaIN".parse::<ColorCorrection>().unwrap(), ColorCorrection::Adain);
        assert_eq!(" wavelet ".parse::<ColorCorrection>().unwrap(), ColorCorrection::Wavelet);
        assert_eq!("".parse::<ColorCorrection>().unwrap(), ColorCorrection::None);
    }

    #[test]
    fn color_correction_rejects_unknown() {
        assert_matches!(
            "sepia".parse::<ColorCorrection>(),
            Err(CoreError::Validation(_))
        );
    }

    // -- UpscaleRequest -------------------------------------------------------

    #[test]
    fn request_rejects_empty_image() {
        let result = UpscaleRequest::new(Vec::new(), UpscaleParams::default());
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn request_exposes_params() {
        let request = UpscaleRequest::new(vec![1u8, 2, 3], params(3, 0.5, 0.2)).unwrap();
        assert_eq!(request.scale(), 3);
        assert!(request.accelerated());
        assert_eq!(request.image_bytes(), &[1, 2, 3]);
    }

    // -- Output size ----------------------------------------------------------

    #[test]
    fn output_size_at_limit_is_accepted() {
        let target = check_output_size(ImageSize::new(50, 50), 2, 10_000).unwrap();
        assert_eq!(target, ImageSize::new(100, 100));
    }

    #[test]
    fn output_size_over_limit_is_rejected() {
        let result = check_output_size(ImageSize::new(13_000, 13_000), 4, 64 * 1024 * 1024);
        assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("52000x52000"));
    }
}
