//! Deterministic Lanczos resampling, the terminal fallback tier.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use upscaler_core::chain::{ProviderTier, LABEL_LANCZOS};
use upscaler_core::progress::ProgressEvent;
use upscaler_core::request::UpscaleParams;
use upscaler_core::types::ImageSize;

use crate::codec::size_of;
use crate::error::ProviderError;
use crate::provider::UpscaleProvider;

/// Blur radius of the smoothed image that sharpening extrapolates away from.
const SHARPEN_SIGMA: f32 = 1.0;

/// Resize `image` to exactly `target` with a Lanczos3 filter.
pub fn resize_exact(image: &DynamicImage, target: ImageSize) -> DynamicImage {
    if size_of(image) == target {
        return image.clone();
    }
    image.resize_exact(target.width, target.height, FilterType::Lanczos3)
}

/// Apply light sharpening and contrast, scaled by `strength` in `0.0..=1.0`.
///
/// Sharpness factor is `1 + strength * 0.5`, contrast factor is
/// `1 + strength * 0.1`; a factor of 1 leaves the image unchanged.
pub fn enhance(image: DynamicImage, strength: f32) -> DynamicImage {
    if strength <= 0.0 {
        return image;
    }
    let rgb = image.into_rgb8();
    let sharpened = sharpen(&rgb, 1.0 + strength * 0.5);
    let contrasted = contrast(&sharpened, 1.0 + strength * 0.1);
    DynamicImage::ImageRgb8(contrasted)
}

/// Extrapolate from a blurred copy: `out = smooth + factor * (img - smooth)`.
fn sharpen(image: &RgbImage, factor: f32) -> RgbImage {
    let smooth = imageops::blur(image, SHARPEN_SIGMA);
    let mut out = image.clone();
    for (dst, src) in out.pixels_mut().zip(smooth.pixels()) {
        let Rgb(orig) = *dst;
        let Rgb(soft) = *src;
        *dst = Rgb(std::array::from_fn(|c| {
            let s = f32::from(soft[c]);
            clamp_u8(s + factor * (f32::from(orig[c]) - s))
        }));
    }
    out
}

/// Scale distance from the mean luminance: `out = mean + factor * (img - mean)`.
fn contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let pixels = u64::from(image.width()) * u64::from(image.height());
    if pixels == 0 {
        return image.clone();
    }
    let luma_sum: f64 = image
        .pixels()
        .map(|Rgb([r, g, b])| {
            0.299 * f64::from(*r) + 0.587 * f64::from(*g) + 0.114 * f64::from(*b)
        })
        .sum();
    let mean = (luma_sum / pixels as f64).round() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let Rgb(channels) = *pixel;
        *pixel = Rgb(channels.map(|v| clamp_u8(mean + factor * (f32::from(v) - mean))));
    }
    out
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Lanczos resampling followed by enhancement at the request's denoise strength.
///
/// Never fails for a decoded image. Emits two synthetic progress events
/// so clients see movement even on the fast path.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResamplingProvider;

impl UpscaleProvider for ResamplingProvider {
    fn tier(&self) -> ProviderTier {
        ProviderTier::Resampling
    }

    fn label(&self) -> String {
        LABEL_LANCZOS.to_string()
    }

    fn invoke(
        &self,
        image: &DynamicImage,
        params: &UpscaleParams,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<DynamicImage, ProviderError> {
        on_progress(ProgressEvent::new(1, 3).with_message("Resizing..."));
        let target = size_of(image).scaled(params.scale);
        let upscaled = resize_exact(image, target);

        let enhanced = enhance(upscaled, params.denoise);
        on_progress(ProgressEvent::new(3, 3).with_message("Enhancing..."));
        Ok(enhanced)
    }
}
