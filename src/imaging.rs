//! Raster conversion for deck images.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::error::{Error, Result};

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

const JPEG_QUALITY: u8 = 75;

/// Decode any supported raster (PNG, JPEG, WebP) and re-encode it as JPEG.
/// Alpha is dropped since JPEG has no transparency.
pub fn to_jpeg(source: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(source)?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out)
}

/// [`to_jpeg`] on the blocking thread pool, off the async workers.
pub async fn to_jpeg_blocking(source: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || to_jpeg(&source))
        .await
        .map_err(|e| Error::Other(format!("image conversion task failed: {e}")))?
}
