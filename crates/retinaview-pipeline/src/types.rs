//! Shared types for the retinaview filter pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::downsample::DownsampleFilter;

/// Re-export `RgbaImage` as the pipeline's raster type so downstream
/// crates can hold decoded and filtered images without depending on
/// `image` directly.
///
/// A `RasterImage` is a flat RGBA8 buffer of `width * height * 4`
/// samples, row-major, top-left origin.
pub use image::RgbaImage as RasterImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of a raster image.
    #[must_use]
    pub fn of(image: &RasterImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which transform stage is applied to the source image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Show the decoded source unchanged.
    #[default]
    Original,
    /// Hessian-based vesselness highlighting of the retinal vasculature.
    Vessel,
    /// Brightness/location heuristic for the optic disc and cup.
    Optic,
    /// Jet colormap remap of luminance ("explainability" heatmap).
    Xai,
}

impl FilterMode {
    /// All modes in UI order.
    pub const ALL: [Self; 4] = [Self::Original, Self::Vessel, Self::Optic, Self::Xai];

    /// The lowercase identifier used on the wire and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Vessel => "vessel",
            Self::Optic => "optic",
            Self::Xai => "xai",
        }
    }

    /// Whether this mode runs a pixel transform. `Original` is a
    /// passthrough and never enters the filter stages.
    #[must_use]
    pub const fn transforms(self) -> bool {
        !matches!(self, Self::Original)
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`FilterMode`] identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter mode {0:?} (expected original, vessel, optic, or xai)")]
pub struct UnknownFilterMode(pub String);

impl FromStr for FilterMode {
    type Err = UnknownFilterMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownFilterMode(s.to_string()))
    }
}

/// A width x height grid of `f32` samples derived from a [`RasterImage`].
///
/// Samples are stored row-major in a flat vector; index `y * width + x`.
/// Reads outside the grid through [`get_clamped`](Self::get_clamped)
/// replicate the nearest edge sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl ScalarField {
    /// A field of the given size filled with zeros.
    #[must_use]
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    /// Build a field by evaluating `f(x, y)` for every sample.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap an existing sample buffer.
    ///
    /// Returns `None` if `data.len() != width * height`.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Width in samples.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in samples.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Field dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Flat sample slice, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume the field and return the sample buffer.
    #[must_use]
    pub fn into_raw(self) -> Vec<f32> {
        self.data
    }

    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Sample at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the field.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[self.index(x, y)]
    }

    /// Sample at `(x, y)` with coordinates clamped into the field, so
    /// out-of-range reads replicate the nearest edge sample.
    ///
    /// Returns `0.0` for an empty field.
    #[must_use]
    pub fn get_clamped(&self, x: i64, y: i64) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let cx = x.clamp(0, i64::from(self.width) - 1);
        let cy = y.clamp(0, i64::from(self.height) - 1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = self.index(cx as u32, cy as u32);
        self.data[index]
    }

    /// Overwrite the sample at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the field.
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let index = self.index(x, y);
        self.data[index] = value;
    }

    /// Largest sample, or `0.0` for an empty field.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0_f32, f32::max)
    }

    /// Mean sample value, or `0.0` for an empty field.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| f64::from(v)).sum();
        (sum / self.data.len() as f64) as f32
    }
}

/// Constants of the vessel (Hessian vesselness) filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselParams {
    /// Gaussian pre-smoothing sigma. Kernel radius is `ceil(3 * sigma)`.
    pub sigma: f32,
    /// Blob-ness sensitivity (Frangi beta).
    pub beta: f32,
    /// Structure-strength sensitivity (Frangi c).
    pub c: f32,
    /// Smaller Hessian eigenvalue must fall below this to be a candidate.
    pub lambda_threshold: f32,
    /// Normalized score above which a pixel renders as vessel.
    pub score_threshold: f32,
    /// Luminance factor for non-vessel pixels.
    pub background_dim: f32,
}

impl VesselParams {
    /// Default Gaussian sigma.
    pub const DEFAULT_SIGMA: f32 = 1.5;
    /// Default Frangi beta.
    pub const DEFAULT_BETA: f32 = 0.5;
    /// Default Frangi c.
    pub const DEFAULT_C: f32 = 15.0;
    /// Default candidate eigenvalue threshold.
    pub const DEFAULT_LAMBDA_THRESHOLD: f32 = -0.5;
    /// Default normalized score threshold.
    pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.15;
    /// Default background dimming factor.
    pub const DEFAULT_BACKGROUND_DIM: f32 = 0.4;
}

impl Default for VesselParams {
    fn default() -> Self {
        Self {
            sigma: Self::DEFAULT_SIGMA,
            beta: Self::DEFAULT_BETA,
            c: Self::DEFAULT_C,
            lambda_threshold: Self::DEFAULT_LAMBDA_THRESHOLD,
            score_threshold: Self::DEFAULT_SCORE_THRESHOLD,
            background_dim: Self::DEFAULT_BACKGROUND_DIM,
        }
    }
}

/// Constants of the optic disc heuristic.
///
/// These are positional/brightness approximations with no validation
/// against annotated disc boundaries. They are kept fixed so output stays
/// comparable across versions; expect misclassification on images where
/// the disc is not bright or not displaced nasally toward the left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticParams {
    /// Luminance above which a pixel is disc regardless of position.
    pub bright_threshold: f32,
    /// Luminance above which a pixel near the anchor is disc.
    pub disc_threshold: f32,
    /// Luminance above which a pixel within the cup radius is cup.
    pub cup_threshold: f32,
    /// Disc radius as a fraction of `min(width, height)`.
    pub radius_fraction: f32,
    /// Horizontal anchor position as a fraction of the image center x.
    pub anchor_x_fraction: f32,
    /// Cup radius as a multiple of the disc radius.
    pub cup_radius_scale: f32,
    /// Blend weight of the disc color over the source pixel.
    pub disc_opacity: f32,
    /// Luminance factor for pixels that are neither disc nor cup.
    pub background_dim: f32,
}

impl OpticParams {
    /// Default unconditional disc luminance.
    pub const DEFAULT_BRIGHT_THRESHOLD: f32 = 180.0;
    /// Default near-anchor disc luminance.
    pub const DEFAULT_DISC_THRESHOLD: f32 = 140.0;
    /// Default cup luminance.
    pub const DEFAULT_CUP_THRESHOLD: f32 = 120.0;
    /// Default disc radius fraction.
    pub const DEFAULT_RADIUS_FRACTION: f32 = 0.15;
    /// Default anchor x fraction.
    pub const DEFAULT_ANCHOR_X_FRACTION: f32 = 0.8;
    /// Default cup radius multiple.
    pub const DEFAULT_CUP_RADIUS_SCALE: f32 = 1.5;
    /// Default disc overlay opacity.
    pub const DEFAULT_DISC_OPACITY: f32 = 0.6;
    /// Default background dimming factor.
    pub const DEFAULT_BACKGROUND_DIM: f32 = 0.7;
}

impl Default for OpticParams {
    fn default() -> Self {
        Self {
            bright_threshold: Self::DEFAULT_BRIGHT_THRESHOLD,
            disc_threshold: Self::DEFAULT_DISC_THRESHOLD,
            cup_threshold: Self::DEFAULT_CUP_THRESHOLD,
            radius_fraction: Self::DEFAULT_RADIUS_FRACTION,
            anchor_x_fraction: Self::DEFAULT_ANCHOR_X_FRACTION,
            cup_radius_scale: Self::DEFAULT_CUP_RADIUS_SCALE,
            disc_opacity: Self::DEFAULT_DISC_OPACITY,
            background_dim: Self::DEFAULT_BACKGROUND_DIM,
        }
    }
}

/// Configuration for loading and filtering.
///
/// All parameters default to the values the filters were tuned with.
/// Missing fields in serialized configs fall back to those defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Longest-side bound applied when loading, in pixels.
    pub max_dimension: u32,
    /// Resampling filter used when the source exceeds `max_dimension`.
    pub downsample_filter: DownsampleFilter,
    /// Vessel mode constants.
    pub vessel: VesselParams,
    /// Optic disc mode constants.
    pub optic: OpticParams,
}

impl FilterConfig {
    /// Default longest-side bound.
    pub const DEFAULT_MAX_DIMENSION: u32 = 600;
    /// Default downsample filter.
    pub const DEFAULT_DOWNSAMPLE_FILTER: DownsampleFilter = DownsampleFilter::Triangle;

    /// Reject configurations the filters cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when `max_dimension` is
    /// zero, the vessel sigma is not a finite non-negative number, or a
    /// vessel constant that is used as a divisor is not a finite
    /// positive number.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_dimension == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_dimension must be at least 1".into(),
            ));
        }
        if !(self.vessel.sigma.is_finite() && self.vessel.sigma >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "vessel sigma must be finite and non-negative (sigma={})",
                self.vessel.sigma
            )));
        }
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !(positive(self.vessel.beta) && positive(self.vessel.c)) {
            return Err(PipelineError::InvalidConfig(format!(
                "vessel beta and c must be positive (beta={}, c={})",
                self.vessel.beta, self.vessel.c
            )));
        }
        Ok(())
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
            downsample_filter: Self::DEFAULT_DOWNSAMPLE_FILTER,
            vessel: VesselParams::default(),
            optic: OpticParams::default(),
        }
    }
}

/// A filtered image encoded for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    /// PNG-encoded bytes.
    pub bytes: Vec<u8>,
    /// Dimensions of the encoded image.
    pub dimensions: Dimensions,
}

impl EncodedImage {
    /// MIME type of [`bytes`](Self::bytes).
    pub const MIME_TYPE: &'static str = "image/png";
}

/// User-facing failure class.
///
/// Decode and compute failures are shown the same way, but the view
/// distinguishes "could not decode" from "no result yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The source bytes could not be turned into a raster.
    Decode,
    /// A filter or encode stage failed.
    Compute,
}

/// Errors that can occur while loading or filtering.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` and `Encode`
/// variants are serialized as their `Display` strings.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The legacy TIFF fallback could not rasterize the source.
    #[error("failed to rasterize legacy TIFF: {0}")]
    LegacyTiff(String),

    /// Encoding the output raster failed.
    #[error("failed to encode output image: {0}")]
    Encode(String),

    /// A filter stage could not run.
    #[error("filter computation failed: {0}")]
    Compute(String),

    /// Filter configuration is invalid.
    #[error("invalid filter configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Classify the error for display.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::EmptyInput | Self::ImageDecode(_) | Self::LegacyTiff(_) => FailureKind::Decode,
            Self::Encode(_) | Self::Compute(_) | Self::InvalidConfig(_) => FailureKind::Compute,
        }
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// A deserialized `ImageDecode` cannot rebuild the original typed
/// `image::ImageError`; it comes back as a generic decoding error that
/// carries the original message.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    EmptyInput,
    ImageDecode(String),
    LegacyTiff(String),
    Encode(String),
    Compute(String),
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::LegacyTiff(s) => PipelineErrorProxy::LegacyTiff(s.clone()),
            Self::Encode(s) => PipelineErrorProxy::Encode(s.clone()),
            Self::Compute(s) => PipelineErrorProxy::Compute(s.clone()),
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::ImageDecode(msg) => Self::ImageDecode(image::ImageError::Decoding(
                image::error::DecodingError::new(image::error::ImageFormatHint::Unknown, msg),
            )),
            PipelineErrorProxy::LegacyTiff(s) => Self::LegacyTiff(s),
            PipelineErrorProxy::Encode(s) => Self::Encode(s),
            PipelineErrorProxy::Compute(s) => Self::Compute(s),
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}
