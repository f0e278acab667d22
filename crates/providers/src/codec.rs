//! Image decoding at ingress and base64 encoding for the wire.

use std::io::Cursor;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use upscaler_core::error::CoreError;
use upscaler_core::types::ImageSize;

/// JPEG quality of progress previews. Low on purpose: previews are
/// frequent and only need to be recognisable.
pub const PREVIEW_JPEG_QUALITY: u8 = 60;

/// Read the dimensions from the image header without decoding pixels.
pub fn read_size(bytes: &[u8]) -> Result<ImageSize, CoreError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CoreError::InvalidImage(e.to_string()))?
        .into_dimensions()
        .map_err(|e| CoreError::InvalidImage(e.to_string()))?;
    Ok(ImageSize::new(width, height))
}

/// Decode uploaded bytes into an 8-bit RGB image.
///
/// Alpha is discarded; every provider works on RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<DynamicImage, CoreError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| CoreError::InvalidImage(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(CoreError::InvalidImage("image has zero size".to_string()));
    }
    Ok(DynamicImage::ImageRgb8(decoded.to_rgb8()))
}

pub fn size_of(image: &DynamicImage) -> ImageSize {
    ImageSize::new(image.width(), image.height())
}

/// Encode as PNG and return standard base64.
pub fn encode_png_base64(image: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buffer.into_inner()))
}

/// Encode as JPEG at `quality` and return standard base64.
pub fn encode_jpeg_base64(image: &DynamicImage, quality: u8) -> Result<String, image::ImageError> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Encode a progress preview, logging and dropping it on failure.
pub fn encode_preview(image: &DynamicImage) -> Option<String> {
    match encode_jpeg_base64(image, PREVIEW_JPEG_QUALITY) {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            tracing::warn!(error = %e, "Preview encode failed");
            None
        }
    }
}
