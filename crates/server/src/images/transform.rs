//! Pure image transformation: decode, downscale, encode to JPEG.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

/// Content type of everything the transformer produces.
pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";

/// Transformation failure.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Downscale `source` to `target_width` pixels wide and encode it as JPEG.
///
/// Never upscales. When the source is already narrow enough it is returned
/// untouched if it is a JPEG, and re-encoded otherwise.
pub fn transform(source: &Bytes, target_width: u32, quality: u8) -> Result<Bytes, TransformError> {
    let format = image::guess_format(source).map_err(|e| TransformError::Decode(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(source, format)
        .map_err(|e| TransformError::Decode(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    if width <= target_width {
        if format == ImageFormat::Jpeg {
            return Ok(source.clone());
        }
        return encode_jpeg(&decoded, quality);
    }

    let target_height = scaled_height(width, height, target_width);
    let resized = decoded.resize_exact(target_width, target_height, FilterType::Lanczos3);
    encode_jpeg(&resized, quality)
}

/// Height preserving the aspect ratio at `target_width`, at least one pixel.
fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = (u64::from(height) * u64::from(target_width) + u64::from(width) / 2) / u64::from(width);
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes, TransformError> {
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| TransformError::Encode(e.to_string()))?;
    Ok(Bytes::from(buffer))
}

/// Sniff a content type from leading bytes.
pub fn content_type_for(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}
