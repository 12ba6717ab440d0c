//! Bounding the decoded image to a maximum working dimension.
//!
//! Reduces the decoded raster so the longest side equals the configured
//! `max_dimension`, preserving aspect ratio. All filter stages are
//! O(width x height), so this bound is what keeps a single filter run
//! within one UI frame.
//!
//! If the image already fits, it is returned unchanged (scale 1.0).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, RasterImage};

/// Resampling filter used when downsampling.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
/// Every variant resamples; there is no way to skip the bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownsampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl DownsampleFilter {
    /// Every filter, fastest first.
    pub const ALL: [Self; 5] = [
        Self::Nearest,
        Self::Triangle,
        Self::CatmullRom,
        Self::Gaussian,
        Self::Lanczos3,
    ];

    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Target dimensions for fitting `source` within `max_dimension` on its
/// longest side.
///
/// The longest side becomes exactly `max_dimension`; the shorter side is
/// scaled by the same factor and rounded to the nearest pixel (minimum 1).
/// Sources that already fit are returned unchanged.
#[must_use]
pub fn bounded_dimensions(source: Dimensions, max_dimension: u32) -> Dimensions {
    let long = source.width.max(source.height);
    if long <= max_dimension || max_dimension == 0 {
        return source;
    }

    let scale = f64::from(max_dimension) / f64::from(long);
    let fit = |side: u32| -> u32 {
        if side == long {
            max_dimension
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let scaled = (f64::from(side) * scale).round() as u32;
            scaled.clamp(1, max_dimension)
        }
    };

    Dimensions {
        width: fit(source.width),
        height: fit(source.height),
    }
}

/// Downsample a decoded image so the longest side is at most
/// `max_dimension` pixels, using the specified resampling filter.
///
/// Returns the (possibly unchanged) image and whether downsampling
/// was actually applied.
#[must_use]
pub fn downsample(
    image: &RasterImage,
    max_dimension: u32,
    filter: DownsampleFilter,
) -> (RasterImage, bool) {
    let source = Dimensions::of(image);
    let target = bounded_dimensions(source, max_dimension);
    if target == source {
        return (image.clone(), false);
    }

    let resized = image::imageops::resize(
        image,
        target.width,
        target.height,
        filter.to_image_filter(),
    );
    (resized, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(w: u32, h: u32) -> RasterImage {
        RasterImage::from_pixel(w, h, image::Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(DownsampleFilter::default(), DownsampleFilter::Triangle);
    }

    #[test]
    fn no_downsample_when_already_small() {
        let img = test_image(100, 80);
        let (result, applied) = downsample(&img, 600, DownsampleFilter::Triangle);
        assert!(!applied);
        assert_eq!(result.dimensions(), (100, 80));
    }

    #[test]
    fn no_downsample_when_exact_match() {
        let img = test_image(600, 400);
        let (result, applied) = downsample(&img, 600, DownsampleFilter::Triangle);
        assert!(!applied);
        assert_eq!(result.dimensions(), (600, 400));
    }

    #[test]
    fn downsample_landscape() {
        let img = test_image(1024, 768);
        let (result, applied) = downsample(&img, 600, DownsampleFilter::Triangle);
        assert!(applied);
        // 768 * 600 / 1024 = 450
        assert_eq!(result.dimensions(), (600, 450));
    }

    #[test]
    fn downsample_portrait() {
        let img = test_image(700, 1400);
        let (result, applied) = downsample(&img, 600, DownsampleFilter::Triangle);
        assert!(applied);
        assert_eq!(result.dimensions(), (300, 600));
    }

    #[test]
    fn downsample_square() {
        let img = test_image(1024, 1024);
        let (result, applied) = downsample(&img, 600, DownsampleFilter::Nearest);
        assert!(applied);
        assert_eq!(result.dimensions(), (600, 600));
    }

    #[test]
    fn every_filter_bounds_large_image() {
        let img = test_image(1024, 768);
        for filter in DownsampleFilter::ALL {
            let (result, applied) = downsample(&img, 600, filter);
            assert!(applied, "{filter}");
            assert_eq!(result.dimensions(), (600, 450), "{filter}");
        }
    }

    #[test]
    fn skip_variant_is_rejected_on_deserialize() {
        assert!(serde_json::from_str::<DownsampleFilter>(r#""Disabled""#).is_err());
    }

    #[test]
    fn bounded_dimensions_rounds_short_side() {
        let d = bounded_dimensions(
            Dimensions {
                width: 1001,
                height: 333,
            },
            600,
        );
        // 333 * 600 / 1001 = 199.6 -> 200
        assert_eq!(
            d,
            Dimensions {
                width: 600,
                height: 200
            }
        );
    }

    #[test]
    fn bounded_dimensions_never_collapses_to_zero() {
        let d = bounded_dimensions(
            Dimensions {
                width: 5000,
                height: 1,
            },
            600,
        );
        assert_eq!(
            d,
            Dimensions {
                width: 600,
                height: 1
            }
        );
    }
}
