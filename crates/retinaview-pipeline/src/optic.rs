//! Optic disc and cup highlighting.
//!
//! A brightness/location classifier, not a segmentation model. The disc
//! is assumed to sit at `(0.8 * cx, cy)`, approximating its typical nasal
//! displacement in a fundus photograph, with radius `0.15 * min(w, h)`.
//! There is no boundary detection: bright lesions, flash reflections, and
//! discs far from the anchor are misclassified. The constants are kept
//! as-is so results stay comparable; see [`OpticParams`].

use crate::channel::{dimmed_gray, luminance, to_channel};
use crate::types::{OpticParams, RasterImage};

/// Disc overlay color.
pub const DISC_COLOR: [u8; 3] = [255, 200, 0];

/// Cup color.
pub const CUP_COLOR: [u8; 3] = [255, 100, 0];

/// Per-pixel classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpticRegion {
    /// Bright, or moderately bright near the anchor.
    Disc,
    /// Not disc, moderately bright within the wider cup radius.
    Cup,
    /// Everything else.
    Background,
}

/// Anchor point and radius of the heuristic for an image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpticGeometry {
    /// Anchor x in pixels.
    pub anchor_x: f32,
    /// Anchor y in pixels.
    pub anchor_y: f32,
    /// Disc radius in pixels.
    pub radius: f32,
}

impl OpticGeometry {
    /// Geometry for a `width x height` image.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(width: u32, height: u32, params: &OpticParams) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            anchor_x: params.anchor_x_fraction * (w / 2.0),
            anchor_y: h / 2.0,
            radius: params.radius_fraction * w.min(h),
        }
    }

    /// Euclidean distance from `(x, y)` to the anchor.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn distance(&self, x: u32, y: u32) -> f32 {
        (x as f32 - self.anchor_x).hypot(y as f32 - self.anchor_y)
    }
}

/// Classify one pixel from its luminance and distance to the anchor.
#[must_use]
pub fn classify(luma: f32, distance: f32, radius: f32, params: &OpticParams) -> OpticRegion {
    if luma > params.bright_threshold || (luma > params.disc_threshold && distance < radius) {
        OpticRegion::Disc
    } else if luma > params.cup_threshold && distance < params.cup_radius_scale * radius {
        OpticRegion::Cup
    } else {
        OpticRegion::Background
    }
}

/// Per-pixel regions of one image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticAnalysis {
    /// Image width in pixels.
    pub width: u32,
    /// Region of every pixel, index `y * width + x`.
    pub regions: Vec<OpticRegion>,
    /// Number of disc pixels.
    pub disc_pixel_count: u64,
    /// Number of cup pixels.
    pub cup_pixel_count: u64,
}

impl OpticAnalysis {
    /// Region of the pixel at `(x, y)`.
    #[must_use]
    pub fn region(&self, x: u32, y: u32) -> OpticRegion {
        self.regions[y as usize * self.width as usize + x as usize]
    }
}

/// Classify every pixel of `image`.
#[must_use = "returns the optic analysis"]
pub fn analyze(image: &RasterImage, params: &OpticParams) -> OpticAnalysis {
    let geometry = OpticGeometry::new(image.width(), image.height(), params);

    let regions: Vec<OpticRegion> = image
        .enumerate_pixels()
        .map(|(x, y, pixel)| {
            classify(
                luminance(pixel.0),
                geometry.distance(x, y),
                geometry.radius,
                params,
            )
        })
        .collect();

    let disc_pixel_count = count_region(&regions, OpticRegion::Disc);
    let cup_pixel_count = count_region(&regions, OpticRegion::Cup);

    tracing::debug!(
        anchor_x = geometry.anchor_x,
        anchor_y = geometry.anchor_y,
        radius = geometry.radius,
        disc_pixel_count,
        cup_pixel_count,
        "optic disc analysis complete"
    );

    OpticAnalysis {
        width: image.width(),
        regions,
        disc_pixel_count,
        cup_pixel_count,
    }
}

fn count_region(regions: &[OpticRegion], wanted: OpticRegion) -> u64 {
    regions.iter().map(|&r| u64::from(r == wanted)).sum()
}

/// Render an analysis over its source image.
#[must_use = "returns the rendered optic image"]
pub fn render(image: &RasterImage, analysis: &OpticAnalysis, params: &OpticParams) -> RasterImage {
    RasterImage::from_fn(image.width(), image.height(), |x, y| {
        let source = image.get_pixel(x, y).0;
        image::Rgba(match analysis.region(x, y) {
            OpticRegion::Disc => blend(DISC_COLOR, source, params.disc_opacity),
            OpticRegion::Cup => [CUP_COLOR[0], CUP_COLOR[1], CUP_COLOR[2], 255],
            OpticRegion::Background => dimmed_gray(luminance(source), params.background_dim),
        })
    })
}

/// Optic mode: classify every pixel and render the overlay.
#[must_use = "returns the optic disc image"]
pub fn optic_filter(image: &RasterImage, params: &OpticParams) -> RasterImage {
    render(image, &analyze(image, params), params)
}

/// `opacity * overlay + (1 - opacity) * source`, fully opaque.
fn blend(overlay: [u8; 3], source: [u8; 4], opacity: f32) -> [u8; 4] {
    let mix = |o: u8, s: u8| {
        let mixed = opacity.mul_add(f32::from(o), (1.0 - opacity) * f32::from(s));
        to_channel(mixed)
    };
    [
        mix(overlay[0], source[0]),
        mix(overlay[1], source[1]),
        mix(overlay[2], source[2]),
        255,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_for_square_image() {
        let g = OpticGeometry::new(100, 100, &OpticParams::default());
        assert!((g.anchor_x - 40.0).abs() < 1e-4);
        assert!((g.anchor_y - 50.0).abs() < 1e-4);
        assert!((g.radius - 15.0).abs() < 1e-4);
    }

    #[test]
    fn geometry_uses_shorter_side_for_radius() {
        let g = OpticGeometry::new(200, 100, &OpticParams::default());
        assert!((g.radius - 15.0).abs() < 1e-4);
        assert!((g.anchor_x - 80.0).abs() < 1e-4);
    }

    #[test]
    fn classification_rules() {
        let p = OpticParams::default();
        // Very bright anywhere is disc.
        assert_eq!(classify(181.0, 1000.0, 15.0, &p), OpticRegion::Disc);
        // Moderately bright needs to be inside the disc radius.
        assert_eq!(classify(150.0, 10.0, 15.0, &p), OpticRegion::Disc);
        assert_eq!(classify(150.0, 20.0, 15.0, &p), OpticRegion::Cup);
        // Cup radius is 1.5x the disc radius.
        assert_eq!(classify(130.0, 22.0, 15.0, &p), OpticRegion::Cup);
        assert_eq!(classify(130.0, 23.0, 15.0, &p), OpticRegion::Background);
        // Dim pixels are background even at the anchor.
        assert_eq!(classify(120.0, 0.0, 15.0, &p), OpticRegion::Background);
    }

    #[test]
    fn thresholds_are_strict() {
        let p = OpticParams::default();
        assert_eq!(classify(180.0, 1000.0, 15.0, &p), OpticRegion::Background);
        assert_eq!(classify(140.0, 0.0, 15.0, &p), OpticRegion::Cup);
    }

    #[test]
    fn render_colors() {
        let p = OpticParams::default();
        // 100x100 image: anchor (40, 50), radius 15.
        let img = RasterImage::from_fn(100, 100, |x, y| {
            if x == 40 && y == 50 {
                image::Rgba([150, 150, 150, 255]) // disc (near anchor)
            } else if x == 60 && y == 50 {
                image::Rgba([130, 130, 130, 255]) // cup (dist 20 < 22.5)
            } else if x == 95 && y == 5 {
                image::Rgba([250, 250, 250, 255]) // disc (bright)
            } else {
                image::Rgba([100, 100, 100, 255])
            }
        });
        let out = optic_filter(&img, &p);

        // 0.6 * [255, 200, 0] + 0.4 * 150
        assert_eq!(out.get_pixel(40, 50).0, [213, 180, 60, 255]);
        assert_eq!(out.get_pixel(60, 50).0, [255, 100, 0, 255]);
        assert_eq!(out.get_pixel(95, 5).0, [253, 220, 100, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [70, 70, 70, 255]);
    }

    #[test]
    fn analysis_counts_regions() {
        let p = OpticParams::default();
        let img = RasterImage::from_fn(100, 100, |x, y| {
            if x == 40 && y == 50 {
                image::Rgba([150, 150, 150, 255])
            } else if x == 60 && y == 50 {
                image::Rgba([130, 130, 130, 255])
            } else {
                image::Rgba([100, 100, 100, 255])
            }
        });
        let analysis = analyze(&img, &p);
        assert_eq!(analysis.disc_pixel_count, 1);
        assert_eq!(analysis.cup_pixel_count, 1);
        assert_eq!(analysis.region(40, 50), OpticRegion::Disc);
        assert_eq!(analysis.region(60, 50), OpticRegion::Cup);
        assert_eq!(analysis.region(0, 99), OpticRegion::Background);
    }

    #[test]
    fn output_dimensions_and_alpha() {
        let img = RasterImage::from_pixel(13, 7, image::Rgba([200, 200, 200, 10]));
        let out = optic_filter(&img, &OpticParams::default());
        assert_eq!(out.dimensions(), (13, 7));
        assert!(out.pixels().all(|p| p.0[3] == 255));
    }
}
