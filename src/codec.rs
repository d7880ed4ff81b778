//! PNG encoding and decoding for 8-bit RGBA pixel buffers.

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

/// Pixel buffer type used throughout the crate: row-major 8-bit RGBA.
pub type PixelBuffer = RgbaImage;

/// Errors from the image codec
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes could not be decoded as PNG
    #[error("Failed to decode PNG: {0}")]
    Decode(String),

    /// The buffer could not be encoded as PNG
    #[error("Failed to encode PNG: {0}")]
    Encode(String),
}

/// Decode PNG bytes into an RGBA buffer. Non-RGBA inputs are converted.
pub fn decode_png(data: &[u8]) -> Result<PixelBuffer, CodecError> {
    let img = image::load_from_memory_with_format(data, ImageFormat::Png)
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

/// Encode an RGBA buffer as PNG bytes.
pub fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    buffer
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}
