//! Separable Gaussian smoothing of scalar fields.
//!
//! The vessel filter estimates second derivatives, which amplify pixel
//! noise; smoothing first keeps the Hessian response tied to structures
//! at the vessel scale.
//!
//! The kernel radius is `ceil(3 * sigma)` and weights are normalized to
//! sum to one. The horizontal pass runs first, then the vertical pass.
//! Reads past the border replicate the edge sample, so a uniform field
//! stays uniform and no dark frame appears around the image.

use crate::types::ScalarField;

/// Normalized 1D Gaussian kernel of radius `ceil(3 * sigma)`.
///
/// The returned vector has `2 * radius + 1` taps, centered at index
/// `radius`. Non-positive sigma yields the identity kernel `[1.0]`.
#[must_use]
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 {
        return vec![1.0];
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let radius = (3.0 * sigma).ceil() as i32;
    let denom = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let x = i as f32;
            (-(x * x) / denom).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Apply a separable Gaussian blur to a scalar field.
///
/// Non-positive sigma returns the field unchanged.
#[must_use = "returns the blurred field"]
pub fn gaussian_blur(field: &ScalarField, sigma: f32) -> ScalarField {
    if sigma <= 0.0 {
        return field.clone();
    }

    let kernel = gaussian_kernel(sigma);
    let horizontal = convolve_1d(field, &kernel, Axis::Horizontal);
    convolve_1d(&horizontal, &kernel, Axis::Vertical)
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Convolve every row (or column) with a centered, odd-length kernel.
fn convolve_1d(field: &ScalarField, kernel: &[f32], axis: Axis) -> ScalarField {
    #[allow(clippy::cast_possible_wrap)]
    let radius = (kernel.len() / 2) as i64;

    ScalarField::from_fn(field.width(), field.height(), |x, y| {
        let (x, y) = (i64::from(x), i64::from(y));
        kernel
            .iter()
            .zip(-radius..=radius)
            .map(|(&w, offset)| {
                let sample = match axis {
                    Axis::Horizontal => field.get_clamped(x + offset, y),
                    Axis::Vertical => field.get_clamped(x, y + offset),
                };
                w * sample
            })
            .sum()
    })
}
