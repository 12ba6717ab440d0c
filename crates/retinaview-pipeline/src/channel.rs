//! Single-channel extraction from RGBA rasters.
//!
//! Vessel mode works on the raw green channel, where retinal vasculature
//! has the highest contrast against the fundus background. Optic and
//! heatmap modes work on perceptual luminance.

use crate::types::{RasterImage, ScalarField};

/// Rec. 601 luminance weights.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Perceptual luminance `0.299 R + 0.587 G + 0.114 B` of one RGBA pixel.
#[must_use]
pub fn luminance(pixel: [u8; 4]) -> f32 {
    LUMA_B.mul_add(
        f32::from(pixel[2]),
        LUMA_R.mul_add(f32::from(pixel[0]), LUMA_G * f32::from(pixel[1])),
    )
}

/// Green channel of every pixel, as `0.0..=255.0` samples.
#[must_use = "returns the extracted green channel"]
pub fn green_channel(image: &RasterImage) -> ScalarField {
    ScalarField::from_fn(image.width(), image.height(), |x, y| {
        f32::from(image.get_pixel(x, y).0[1])
    })
}

/// Perceptual luminance of every pixel, as `0.0..=255.0` samples.
#[must_use = "returns the luminance field"]
pub fn luminance_field(image: &RasterImage) -> ScalarField {
    ScalarField::from_fn(image.width(), image.height(), |x, y| {
        luminance(image.get_pixel(x, y).0)
    })
}

/// Gray RGBA pixel from a luminance sample scaled by `factor`.
#[must_use]
pub fn dimmed_gray(luma: f32, factor: f32) -> [u8; 4] {
    let v = to_channel(luma * factor);
    [v, v, v, 255]
}

/// Round and clamp a sample into an 8-bit channel value.
#[must_use]
pub fn to_channel(value: f32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let v = value.round().clamp(0.0, 255.0) as u8;
    v
}
