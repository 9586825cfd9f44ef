//! Test fixtures for generating test images.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Counter for generating unique origin URLs.
static URL_COUNTER: AtomicU64 = AtomicU64::new(1);

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

/// A PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    Bytes::from(buf.into_inner())
}

/// A JPEG of the given size.
#[allow(dead_code)]
pub fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    let mut buf = Vec::new();
    gradient(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 90))
        .expect("Failed to encode JPEG fixture");
    Bytes::from(buf)
}

/// Decoded `(width, height)` of an encoded image.
#[allow(dead_code)]
pub fn image_dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).expect("Failed to decode image");
    (img.width(), img.height())
}

/// A unique origin URL.
pub fn origin_url(name: &str) -> String {
    let n = URL_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("https://origin.test/{n}/{name}")
}

/// Deadline `secs` from now.
pub fn deadline_in(secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(secs)
}
