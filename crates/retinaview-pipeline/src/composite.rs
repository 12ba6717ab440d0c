//! Output compositing: RGBA buffer to a displayable PNG.
//!
//! No resampling happens here; the encoded image has exactly the
//! dimensions of the buffer it was given. Browser callers wrap the bytes
//! in a Blob URL (see `retinaview-io`).

use image::ImageEncoder;

use crate::types::{Dimensions, EncodedImage, PipelineError, RasterImage};

/// Encode an RGBA raster as PNG bytes.
///
/// # Errors
///
/// Returns the encoder's error if the buffer cannot be written.
pub fn encode_png(image: &RasterImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(buf)
}

/// Encode a final raster for display.
///
/// # Errors
///
/// Returns [`PipelineError::Encode`] if PNG encoding fails, so the
/// caller shows a rendering failure instead of an empty frame.
pub fn composite(image: &RasterImage) -> Result<EncodedImage, PipelineError> {
    let bytes = encode_png(image).map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(EncodedImage {
        bytes,
        dimensions: Dimensions::of(image),
    })
}
