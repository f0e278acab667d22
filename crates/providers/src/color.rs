//! Color correction of neural outputs against the source image.
//!
//! Neural upscalers tend to drift in tint and exposure. Both corrections
//! pull the output's color statistics back towards the source while
//! keeping the detail the model produced.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use upscaler_core::request::ColorCorrection;

/// Apply `mode` to `output` using `source` as the color reference.
pub fn apply(mode: ColorCorrection, output: DynamicImage, source: &DynamicImage) -> DynamicImage {
    match mode {
        ColorCorrection::None => output,
        ColorCorrection::Adain => {
            DynamicImage::ImageRgb8(adain(&output.into_rgb8(), &source.to_rgb8()))
        }
        ColorCorrection::Wavelet => {
            DynamicImage::ImageRgb8(wavelet(&output.into_rgb8(), &source.to_rgb8()))
        }
    }
}

/// Per-channel mean and standard deviation.
fn channel_stats(image: &RgbImage) -> [(f64, f64); 3] {
    let count = (u64::from(image.width()) * u64::from(image.height())).max(1) as f64;
    let mut sum = [0f64; 3];
    let mut sum_sq = [0f64; 3];
    for Rgb(channels) in image.pixels() {
        for c in 0..3 {
            let v = f64::from(channels[c]);
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }
    std::array::from_fn(|c| {
        let mean = sum[c] / count;
        let variance = (sum_sq[c] / count - mean * mean).max(0.0);
        (mean, variance.sqrt())
    })
}

/// Transfer per-channel mean and standard deviation from `reference`.
fn adain(output: &RgbImage, reference: &RgbImage) -> RgbImage {
    let out_stats = channel_stats(output);
    let ref_stats = channel_stats(reference);

    let mut corrected = output.clone();
    for Rgb(channels) in corrected.pixels_mut() {
        for c in 0..3 {
            let (out_mean, out_std) = out_stats[c];
            let (ref_mean, ref_std) = ref_stats[c];
            let v = f64::from(channels[c]);
            let normalized = if out_std > f64::EPSILON {
                (v - out_mean) / out_std
            } else {
                0.0
            };
            channels[c] = (normalized * ref_std + ref_mean).round().clamp(0.0, 255.0) as u8;
        }
    }
    corrected
}

/// Low-pass radius, proportional to the output size.
fn wavelet_sigma(image: &RgbImage) -> f32 {
    (image.width().max(image.height()) as f32 / 256.0).max(2.0)
}

/// Keep the output's high frequencies, take the low frequencies from the
/// reference resampled to the output size.
fn wavelet(output: &RgbImage, reference: &RgbImage) -> RgbImage {
    let resized = imageops::resize(reference, output.width(), output.height(), FilterType::Lanczos3);
    let sigma = wavelet_sigma(output);
    let out_low = imageops::blur(output, sigma);
    let ref_low = imageops::blur(&resized, sigma);

    let mut corrected = output.clone();
    for ((dst, o_low), r_low) in corrected
        .pixels_mut()
        .zip(out_low.pixels())
        .zip(ref_low.pixels())
    {
        let Rgb(orig) = *dst;
        *dst = Rgb(std::array::from_fn(|c| {
            let high = f32::from(orig[c]) - f32::from(o_low[c]);
            (high + f32::from(r_low[c])).round().clamp(0.0, 255.0) as u8
        }));
    }
    corrected
}
