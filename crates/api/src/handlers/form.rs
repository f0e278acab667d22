//! Multipart ingress for the upscale endpoints.

use std::str::FromStr;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use upscaler_core::error::CoreError;
use upscaler_core::request::{ColorCorrection, UpscaleParams, UpscaleRequest};

use crate::error::{AppError, AppResult};

/// Read the upscale form and build a validated [`UpscaleRequest`].
///
/// Fields: `image` (required), `scale`, `denoise`, `creativity`, `use_ml`
/// (or `use_accelerated`) and `color_correction`. Omitted fields take
/// their defaults; unknown fields are ignored.
pub async fn parse_upscale_form(mut multipart: Multipart) -> AppResult<UpscaleRequest> {
    let mut image: Option<Vec<u8>> = None;
    let mut params = UpscaleParams::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let data = field.bytes().await.map_err(multipart_error)?;
                image = Some(data.to_vec());
            }
            "scale" => params.scale = parse_field(&name, &field_text(field).await?)?,
            "denoise" => params.denoise = parse_field(&name, &field_text(field).await?)?,
            "creativity" => params.creativity = parse_field(&name, &field_text(field).await?)?,
            "use_ml" | "use_accelerated" => {
                params.accelerated = parse_bool(&name, &field_text(field).await?)?
            }
            "color_correction" => {
                params.color_correction = ColorCorrection::from_str(&field_text(field).await?)?
            }
            _ => {} // ignore unknown fields
        }
    }

    let image = image.ok_or_else(|| AppError::BadRequest("Missing required 'image' field".into()))?;
    Ok(UpscaleRequest::new(image, params)?)
}

async fn field_text(field: Field<'_>) -> AppResult<String> {
    field.text().await.map_err(multipart_error)
}

fn parse_field<T: FromStr>(name: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{name} has an invalid value \"{}\"", raw.trim())))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, CoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(CoreError::Validation(format!(
            "{name} must be a boolean (got \"{other}\")"
        ))),
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("use_ml", "True").unwrap());
        assert!(!parse_bool("use_ml", "0").unwrap());
        assert!(!parse_bool("use_ml", " off ").unwrap());
        assert_matches!(parse_bool("use_ml", "maybe"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn parse_field_reports_name() {
        let err = parse_field::<u32>("scale", "two").unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("scale"));
        assert_eq!(parse_field::<f32>("denoise", " 0.5 ").unwrap(), 0.5);
    }
}
