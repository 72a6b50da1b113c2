//! Image encoding: page-image bytes → base64 `ImageData` for the VLM request.
//!
//! PNG and JPEG go through untouched; every other decodable format is
//! re-encoded to PNG first because not every provider accepts it.
//! `detail: "high"` asks GPT-4-class models for the full tile budget so
//! small dimension callouts stay legible.

use crate::error::UnitError;
use crate::pipeline::render::encode_png;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use tracing::debug;

/// Wrap raw image bytes as a provider image attachment.
pub fn encode_image(bytes: &[u8]) -> Result<ImageData, UnitError> {
    let format = image::guess_format(bytes).map_err(|e| UnitError::Encode(e.to_string()))?;

    let (payload, mime) = match format {
        ImageFormat::Png => (STANDARD.encode(bytes), "image/png"),
        ImageFormat::Jpeg => (STANDARD.encode(bytes), "image/jpeg"),
        _ => {
            let img = image::load_from_memory(bytes).map_err(|e| UnitError::Encode(e.to_string()))?;
            let png = encode_png(&img).map_err(|e| UnitError::Encode(e.to_string()))?;
            (STANDARD.encode(&png), "image/png")
        }
    };
    debug!("Encoded image → {} bytes base64 ({})", payload.len(), mime);

    Ok(ImageData::new(payload, mime).with_detail("high"))
}
