//! Luminance heatmap ("xAI" mode).
//!
//! A per-pixel colormap lookup with no spatial filtering: luminance is
//! scaled to `t` in `[0, 1]` and mapped through a 4-segment jet-like
//! ramp blue -> cyan -> green -> yellow -> red.

use crate::channel::{luminance, to_channel};
use crate::types::RasterImage;

/// Colormap stops at `t = 0, 0.25, 0.5, 0.75, 1`.
const STOPS: [[f32; 3]; 5] = [
    [0.0, 0.0, 255.0],
    [0.0, 255.0, 255.0],
    [0.0, 255.0, 0.0],
    [255.0, 255.0, 0.0],
    [255.0, 0.0, 0.0],
];

/// Number of linear segments between [`STOPS`].
const SEGMENTS: f32 = 4.0;

/// Map `t` through the jet colormap. `t` is clamped to `[0, 1]`; NaN
/// maps to the `t = 0` color.
#[must_use]
pub fn jet(t: f32) -> [u8; 3] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * SEGMENTS;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let segment = (scaled.floor() as usize).min(STOPS.len() - 2);
    #[allow(clippy::cast_precision_loss)]
    let frac = scaled - segment as f32;

    let (from, to) = (STOPS[segment], STOPS[segment + 1]);
    std::array::from_fn(|c| to_channel((to[c] - from[c]).mul_add(frac, from[c])))
}

/// Heatmap mode: remap every pixel's luminance through [`jet`].
#[must_use = "returns the heatmap image"]
pub fn heatmap_filter(image: &RasterImage) -> RasterImage {
    RasterImage::from_fn(image.width(), image.height(), |x, y| {
        let t = luminance(image.get_pixel(x, y).0) / 255.0;
        let [r, g, b] = jet(t);
        image::Rgba([r, g, b, 255])
    })
}
