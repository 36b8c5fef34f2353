//! Frame export facade.
//!
//! Converts in-memory frames to transport-ready encoded form for the
//! presentation layer. PNG keeps annotation text legible; the data-URI
//! helper matches how frames are embedded by web front ends.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::io::Cursor;

use crate::Frame;

/// Encode a frame as PNG bytes.
///
/// A malformed buffer surfaces as an error to the caller; it never reaches
/// back into the acquisition loop that produced the frame.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    PngEncoder::new(&mut bytes)
        .write_image(
            frame.image.as_raw(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )
        .context("encode frame as PNG")?;
    Ok(bytes.into_inner())
}

/// Encode a frame as a `data:image/png;base64,...` URI.
pub fn png_data_uri(frame: &Frame) -> Result<String> {
    let bytes = encode_png(frame)?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
}
