//! retinaview-pipeline: Fundus image feature visualization (sans-IO).
//!
//! Turns a source image into a filtered display image through:
//! decode -> bound to the maximum dimension -> mode transform -> PNG.
//!
//! The transforms are heuristic visualizations, not diagnostic
//! segmentation: a Hessian vesselness map, a brightness/location optic
//! disc highlighter, and a luminance heatmap.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! byte slices and returns structured data. Browser interaction lives in
//! `retinaview-io`, and request sequencing lives in [`session`].

pub mod blur;
pub mod channel;
pub mod composite;
pub mod decode;
pub mod diagnostics;
pub mod downsample;
pub mod gradient;
pub mod heatmap;
pub mod optic;
pub mod session;
pub mod types;
pub mod vessel;

pub use decode::{DecoderKind, ImageDecoder};
pub use diagnostics::{Clock, FilterDiagnostics, WebClock, process_with_diagnostics};
pub use downsample::DownsampleFilter;
pub use session::{Commit, FilterRequest, ImageSlot, RequestId, Shown, ViewSession, ViewState};
pub use types::{
    Dimensions, EncodedImage, FailureKind, FilterConfig, FilterMode, OpticParams, PipelineError,
    RasterImage, ScalarField, VesselParams,
};

/// A decoded source bounded to the working resolution.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The bounded RGBA raster every filter works on.
    pub image: RasterImage,
    /// Decoder that produced the raster.
    pub decoder: DecoderKind,
    /// Dimensions before bounding.
    pub source_dimensions: Dimensions,
    /// Whether the source was resampled.
    pub downsampled: bool,
}

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Mode that produced the output.
    pub mode: FilterMode,
    /// Decoder that produced the source raster.
    pub decoder: DecoderKind,
    /// Dimensions of the decoded source, before bounding.
    pub source_dimensions: Dimensions,
    /// Filtered raster at the bounded resolution.
    pub image: RasterImage,
    /// PNG encoding of [`image`](Self::image).
    pub encoded: EncodedImage,
}

/// Decode `bytes` and bound the result to `config.max_dimension`.
///
/// `source_name` is the file name or URL the bytes came from, if known;
/// it only influences decoder selection.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an unusable config,
/// [`PipelineError::EmptyInput`] for empty input, and
/// [`PipelineError::ImageDecode`] or [`PipelineError::LegacyTiff`] when
/// the bytes cannot be decoded.
pub fn load(
    bytes: &[u8],
    source_name: Option<&str>,
    config: &FilterConfig,
) -> Result<LoadedImage, PipelineError> {
    config.validate()?;
    let (decoded, decoder) = decode::decode_source(bytes, source_name)?;
    let source_dimensions = Dimensions::of(&decoded);
    let (image, downsampled) =
        downsample::downsample(&decoded, config.max_dimension, config.downsample_filter);
    tracing::debug!(
        source = %source_dimensions,
        bounded = %Dimensions::of(&image),
        downsampled,
        "source image loaded"
    );
    Ok(LoadedImage {
        image,
        decoder,
        source_dimensions,
        downsampled,
    })
}

/// Apply `mode` to an already loaded raster.
///
/// The output always has the input's dimensions. [`FilterMode::Original`]
/// returns an unmodified copy.
#[must_use = "returns the filtered image"]
pub fn apply_filter(image: &RasterImage, mode: FilterMode, config: &FilterConfig) -> RasterImage {
    match mode {
        FilterMode::Original => image.clone(),
        FilterMode::Vessel => vessel::vessel_filter(image, &config.vessel),
        FilterMode::Optic => optic::optic_filter(image, &config.optic),
        FilterMode::Xai => heatmap::heatmap_filter(image),
    }
}

/// Run the full pipeline: decode, bound, filter, and encode.
///
/// # Errors
///
/// See [`process_with_diagnostics`].
pub fn process(
    bytes: &[u8],
    source_name: Option<&str>,
    mode: FilterMode,
    config: &FilterConfig,
) -> Result<ProcessResult, PipelineError> {
    let (result, _) = process_with_diagnostics(bytes, source_name, mode, config, &WebClock)?;
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = RasterImage::from_fn(width, height, |x, y| {
            image::Rgba([
                u8::try_from(x % 256).unwrap(),
                u8::try_from(y % 256).unwrap(),
                128,
                255,
            ])
        });
        composite::encode_png(&img).unwrap()
    }

    #[test]
    fn load_bounds_large_sources() {
        let loaded = load(&gradient_png(1024, 768), None, &FilterConfig::default()).unwrap();
        assert_eq!(
            Dimensions::of(&loaded.image),
            Dimensions {
                width: 600,
                height: 450
            }
        );
        assert_eq!(
            loaded.source_dimensions,
            Dimensions {
                width: 1024,
                height: 768
            }
        );
        assert!(loaded.downsampled);
        assert_eq!(loaded.decoder, DecoderKind::Standard);
    }

    #[test]
    fn load_keeps_small_sources() {
        let loaded = load(&gradient_png(64, 32), None, &FilterConfig::default()).unwrap();
        assert_eq!(loaded.image.dimensions(), (64, 32));
        assert!(!loaded.downsampled);
    }

    #[test]
    fn load_rejects_empty_input() {
        let err = load(&[], None, &FilterConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
        assert_eq!(err.failure_kind(), FailureKind::Decode);
    }

    #[test]
    fn load_rejects_garbage() {
        let err = load(b"definitely not an image", None, &FilterConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ImageDecode(_)));
    }

    #[test]
    fn original_is_passthrough() {
        let config = FilterConfig::default();
        let loaded = load(&gradient_png(20, 10), None, &config).unwrap();
        let out = apply_filter(&loaded.image, FilterMode::Original, &config);
        assert_eq!(out, loaded.image);
    }

    #[test]
    fn every_mode_preserves_dimensions() {
        let config = FilterConfig::default();
        let loaded = load(&gradient_png(37, 23), None, &config).unwrap();
        for mode in FilterMode::ALL {
            let out = apply_filter(&loaded.image, mode, &config);
            assert_eq!(out.dimensions(), (37, 23), "{mode}");
        }
    }

    #[test]
    fn process_encodes_bounded_output() {
        let result = process(
            &gradient_png(900, 300),
            Some("fundus.png"),
            FilterMode::Xai,
            &FilterConfig::default(),
        )
        .unwrap();
        assert_eq!(
            result.encoded.dimensions,
            Dimensions {
                width: 600,
                height: 200
            }
        );
        assert_eq!(result.image.dimensions(), (600, 200));
        assert_eq!(result.mode, FilterMode::Xai);
        let decoded = image::load_from_memory(&result.encoded.bytes)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded, result.image);
    }

    #[test]
    fn process_matches_load_then_apply() {
        let config = FilterConfig::default();
        let bytes = gradient_png(50, 40);
        let loaded = load(&bytes, None, &config).unwrap();
        let direct = apply_filter(&loaded.image, FilterMode::Optic, &config);
        let result = process(&bytes, None, FilterMode::Optic, &config).unwrap();
        assert_eq!(result.image, direct);
    }
}
