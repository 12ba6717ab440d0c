//! Vessel highlighting via a single-scale, Frangi-style Hessian filter.
//!
//! # Algorithm
//!
//! 1. Take the green channel and invert it (`255 - g`), so dark vessels
//!    on the bright fundus become ridges.
//! 2. Smooth with a separable Gaussian (`sigma = 1.5`, radius
//!    `ceil(3 * sigma)`, clamped borders).
//! 3. Estimate the Sobel gradient of the smoothed field (diagnostics only).
//! 4. At every pixel at least 2 pixels from each border, estimate the
//!    Hessian with central second differences and take its eigenvalues
//!    `lambda1 >= lambda2`.
//! 5. A pixel is a candidate only if `lambda2 < -0.5`: strong negative
//!    curvature across a ridge, which is a dark tube in the source. Its
//!    score is
//!    `exp(-Rb^2 / 2 beta^2) * (1 - exp(-S^2 / 2 c^2)) * |lambda2|` with
//!    `Rb = |lambda1| / (|lambda2| + eps)` and `S = sqrt(lambda1^2 + lambda2^2)`.
//! 6. Scores are divided by the global maximum; normalized scores above
//!    `0.15` render as green vessel pixels scaled by score, everything
//!    else as the source luminance dimmed to 40 %.
//!
//! This is a fixed heuristic, not a trained model, and is bit-reproducible
//! for identical input and parameters.

use crate::blur::gaussian_blur;
use crate::channel::{dimmed_gray, green_channel, luminance, to_channel};
use crate::gradient::sobel;
use crate::types::{RasterImage, ScalarField, VesselParams};

/// Guards the blob-ness ratio against division by zero.
const EPSILON: f32 = 1e-10;

/// Pixels closer than this to any border are never scored.
const MARGIN: u32 = 2;

/// Peak vessel tint (RGB) at normalized score 1.0.
const VESSEL_TINT: [f32; 3] = [30.0, 255.0, 60.0];

/// Eigenvalues of a symmetric 2x2 Hessian, `lambda1 >= lambda2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HessianEigenvalues {
    /// The larger eigenvalue.
    pub lambda1: f32,
    /// The smaller eigenvalue.
    pub lambda2: f32,
}

impl HessianEigenvalues {
    /// Eigenvalues of `[[hxx, hxy], [hxy, hyy]]` from the trace and
    /// determinant. The discriminant is clamped at zero so rounding can
    /// never produce a NaN.
    #[must_use]
    pub fn from_hessian(hxx: f32, hyy: f32, hxy: f32) -> Self {
        let trace = hxx + hyy;
        let det = hxx.mul_add(hyy, -(hxy * hxy));
        let discriminant = trace.mul_add(trace, -4.0 * det).max(0.0).sqrt();
        Self {
            lambda1: (trace + discriminant) / 2.0,
            lambda2: (trace - discriminant) / 2.0,
        }
    }

    /// Raw vesselness score, or `0.0` if this is not a candidate.
    #[must_use]
    pub fn score(self, params: &VesselParams) -> f32 {
        let Self { lambda1, lambda2 } = self;
        if lambda2 >= params.lambda_threshold {
            return 0.0;
        }

        let rb = lambda1.abs() / (lambda2.abs() + EPSILON);
        let s = lambda1.hypot(lambda2);
        let beta_term = (-(rb * rb) / (2.0 * params.beta * params.beta)).exp();
        let structure_term = 1.0 - (-(s * s) / (2.0 * params.c * params.c)).exp();
        beta_term * structure_term * lambda2.abs()
    }
}

/// Intermediate and final fields of one vessel analysis.
#[derive(Debug, Clone)]
pub struct VesselAnalysis {
    /// Smoothed, inverted green channel.
    pub smoothed: ScalarField,
    /// Mean Sobel gradient magnitude of `smoothed`.
    pub mean_gradient: f32,
    /// Raw per-pixel scores (zero outside the margin and for
    /// non-candidates).
    pub scores: ScalarField,
    /// Largest raw score.
    pub max_score: f32,
    /// Scores divided by `max_score` (all zero when `max_score` is zero).
    pub normalized: ScalarField,
    /// Number of pixels whose normalized score exceeds the threshold.
    pub vessel_pixel_count: u64,
}

impl VesselAnalysis {
    /// Whether the pixel at `(x, y)` renders as vessel.
    #[must_use]
    pub fn is_vessel(&self, x: u32, y: u32, params: &VesselParams) -> bool {
        self.normalized.get(x, y) > params.score_threshold
    }
}

/// Inverted green channel: dark vessels become bright ridges.
#[must_use]
pub fn vessel_contrast(image: &RasterImage) -> ScalarField {
    let green = green_channel(image);
    let (w, h) = (green.width(), green.height());
    let inverted = green.into_raw().into_iter().map(|g| 255.0 - g).collect();
    ScalarField::from_raw(w, h, inverted).unwrap_or_else(|| ScalarField::zeros(w, h))
}

/// Raw Hessian vesselness scores of a smoothed field.
#[must_use = "returns the score field"]
pub fn hessian_scores(field: &ScalarField, params: &VesselParams) -> ScalarField {
    let (w, h) = (field.width(), field.height());
    let mut scores = ScalarField::zeros(w, h);
    if w <= 2 * MARGIN || h <= 2 * MARGIN {
        return scores;
    }

    for y in MARGIN..h - MARGIN {
        for x in MARGIN..w - MARGIN {
            let i = |dx: i32, dy: i32| {
                field.get(x.saturating_add_signed(dx), y.saturating_add_signed(dy))
            };
            let center = i(0, 0);
            let hxx = i(-1, 0) - 2.0 * center + i(1, 0);
            let hyy = i(0, -1) - 2.0 * center + i(0, 1);
            let hxy = (i(1, 1) - i(-1, 1) - i(1, -1) + i(-1, -1)) / 4.0;

            let score = HessianEigenvalues::from_hessian(hxx, hyy, hxy).score(params);
            scores.set(x, y, score);
        }
    }
    scores
}

/// Run the vessel analysis without rendering.
#[must_use = "returns the vessel analysis"]
pub fn analyze(image: &RasterImage, params: &VesselParams) -> VesselAnalysis {
    let smoothed = gaussian_blur(&vessel_contrast(image), params.sigma);
    let mean_gradient = sobel(&smoothed).magnitude().mean();

    let scores = hessian_scores(&smoothed, params);
    let max_score = scores.max();
    let normalized = if max_score > 0.0 {
        let (w, h) = (scores.width(), scores.height());
        ScalarField::from_fn(w, h, |x, y| scores.get(x, y) / max_score)
    } else {
        ScalarField::zeros(scores.width(), scores.height())
    };

    let vessel_pixel_count = normalized
        .as_slice()
        .iter()
        .map(|&v| u64::from(v > params.score_threshold))
        .sum();

    tracing::debug!(
        max_score,
        mean_gradient,
        vessel_pixel_count,
        "vessel analysis complete"
    );

    VesselAnalysis {
        smoothed,
        mean_gradient,
        scores,
        max_score,
        normalized,
        vessel_pixel_count,
    }
}

/// Render an analysis over its source image.
#[must_use = "returns the rendered vessel image"]
pub fn render(
    image: &RasterImage,
    analysis: &VesselAnalysis,
    params: &VesselParams,
) -> RasterImage {
    RasterImage::from_fn(image.width(), image.height(), |x, y| {
        let n = analysis.normalized.get(x, y);
        if n > params.score_threshold {
            image::Rgba([
                to_channel(VESSEL_TINT[0] * n),
                to_channel(VESSEL_TINT[1] * n),
                to_channel(VESSEL_TINT[2] * n),
                255,
            ])
        } else {
            image::Rgba(dimmed_gray(
                luminance(image.get_pixel(x, y).0),
                params.background_dim,
            ))
        }
    })
}

/// Vessel mode: analyze and render in one step.
#[must_use = "returns the vessel image"]
pub fn vessel_filter(image: &RasterImage, params: &VesselParams) -> RasterImage {
    render(image, &analyze(image, params), params)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Uniform bright background with a 2-pixel dark vertical line at
    /// columns 19 and 20.
    fn dark_line_image() -> RasterImage {
        RasterImage::from_fn(40, 40, |x, _| {
            if x == 19 || x == 20 {
                image::Rgba([60, 40, 30, 255])
            } else {
                image::Rgba([220, 200, 150, 255])
            }
        })
    }

    #[test]
    fn eigenvalues_of_diagonal_hessian() {
        let e = HessianEigenvalues::from_hessian(-25.0, 0.0, 0.0);
        assert!(e.lambda1.abs() < 1e-6);
        assert!((e.lambda2 + 25.0).abs() < 1e-5);

        let e = HessianEigenvalues::from_hessian(3.0, 7.0, 0.0);
        assert!((e.lambda1 - 7.0).abs() < 1e-5);
        assert!((e.lambda2 - 3.0).abs() < 1e-5);
    }

    #[test]
    fn eigenvalues_with_cross_term() {
        // [[2, 1], [1, 2]] has eigenvalues 3 and 1.
        let e = HessianEigenvalues::from_hessian(2.0, 2.0, 1.0);
        assert!((e.lambda1 - 3.0).abs() < 1e-5);
        assert!((e.lambda2 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn non_candidates_score_zero() {
        let params = VesselParams::default();
        let e = HessianEigenvalues {
            lambda1: 0.0,
            lambda2: -0.5,
        };
        assert!(e.score(&params).abs() < f32::EPSILON);
        let e = HessianEigenvalues {
            lambda1: 12.0,
            lambda2: 0.0,
        };
        assert!(e.score(&params).abs() < f32::EPSILON);
    }

    #[test]
    fn ideal_tube_score() {
        // lambda1 = 0 gives Rb = 0, so only the structure term scales |lambda2|.
        let params = VesselParams::default();
        let e = HessianEigenvalues {
            lambda1: 0.0,
            lambda2: -15.0,
        };
        let expected = (1.0 - (-225.0_f32 / 450.0).exp()) * 15.0;
        assert!((e.score(&params) - expected).abs() < 1e-4);
    }

    #[test]
    fn blob_scores_lower_than_tube() {
        let params = VesselParams::default();
        let tube = HessianEigenvalues {
            lambda1: 0.0,
            lambda2: -10.0,
        };
        let blob = HessianEigenvalues {
            lambda1: -10.0,
            lambda2: -10.0,
        };
        assert!(tube.score(&params) > blob.score(&params));
    }

    #[test]
    fn dark_line_is_vessel_background_is_not() {
        let params = VesselParams::default();
        let img = dark_line_image();
        let analysis = analyze(&img, &params);

        for y in 2..38 {
            assert!(analysis.is_vessel(19, y, &params), "(19, {y}) not vessel");
            assert!(analysis.is_vessel(20, y, &params), "(20, {y}) not vessel");
            for x in [2, 5, 10, 15, 24, 30, 37] {
                assert!(
                    analysis.normalized.get(x, y) < 0.01,
                    "background ({x}, {y}) scored {}",
                    analysis.normalized.get(x, y)
                );
            }
        }
        assert!(analysis.max_score > 0.0);
    }

    #[test]
    fn margin_is_never_scored() {
        let params = VesselParams::default();
        let analysis = analyze(&dark_line_image(), &params);
        for x in 0..40 {
            for y in [0, 1, 38, 39] {
                assert!(analysis.scores.get(x, y).abs() < f32::EPSILON);
                assert!(analysis.scores.get(y, x).abs() < f32::EPSILON);
            }
        }
    }

    #[test]
    fn uniform_image_has_no_vessels() {
        let params = VesselParams::default();
        let img = RasterImage::from_pixel(20, 20, image::Rgba([200, 180, 120, 255]));
        let analysis = analyze(&img, &params);
        assert!(analysis.max_score.abs() < f32::EPSILON);
        assert_eq!(analysis.vessel_pixel_count, 0);
        let normalized = analysis.normalized.as_slice();
        assert!(normalized.iter().all(|v| v.abs() < f32::EPSILON));
    }

    #[test]
    fn tiny_image_does_not_panic() {
        let params = VesselParams::default();
        let img = RasterImage::from_pixel(3, 2, image::Rgba([10, 10, 10, 255]));
        let out = vessel_filter(&img, &params);
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn render_tints_vessels_and_dims_background() {
        let params = VesselParams::default();
        let img = dark_line_image();
        let out = vessel_filter(&img, &params);

        let vessel = out.get_pixel(19, 20).0;
        assert!(vessel[1] > vessel[0] && vessel[1] > vessel[2], "{vessel:?}");
        assert_eq!(vessel[3], 255);

        let expected_bg = dimmed_gray(luminance([220, 200, 150, 255]), 0.4);
        assert_eq!(out.get_pixel(5, 5).0, expected_bg);
        assert_eq!(out.get_pixel(0, 0).0, expected_bg);
    }

    #[test]
    fn vessel_filter_is_deterministic() {
        let params = VesselParams::default();
        let img = dark_line_image();
        assert_eq!(vessel_filter(&img, &params), vessel_filter(&img, &params));
    }
}
