//! Source image decoding.
//!
//! This module defines the [`ImageDecoder`] trait for pluggable
//! `bytes -> RasterImage` strategies and the [`DecoderKind`] enum for
//! selecting one from the source's file signature and name.
//!
//! # Strategy pattern
//!
//! Browsers cannot rasterize legacy high-bit-depth TIFF scans, so those
//! go through a dedicated path: full-frame decode at native bit depth,
//! rasterize to 8-bit RGBA, re-encode as PNG, then decode that PNG the
//! standard way. Everything downstream (downsample, channel extraction,
//! filters) only ever sees a [`RasterImage`] and is decoder-agnostic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, RasterImage};

/// Little-endian TIFF signature (`II*\0`).
const TIFF_LE_MAGIC: [u8; 4] = [0x49, 0x49, 0x2A, 0x00];
/// Big-endian TIFF signature (`MM\0*`).
const TIFF_BE_MAGIC: [u8; 4] = [0x4D, 0x4D, 0x00, 0x2A];

/// Selects which decoding strategy to use for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecoderKind {
    /// PNG, JPEG, BMP, and WebP through `image::load_from_memory`.
    #[default]
    Standard,
    /// Legacy TIFF: full-frame decode, rasterize to RGBA8, PNG re-encode.
    LegacyTiff,
}

impl DecoderKind {
    /// Pick a decoder for `bytes`, optionally named by `source_name`
    /// (a file name or URL).
    ///
    /// A TIFF signature always selects [`LegacyTiff`](Self::LegacyTiff).
    /// Otherwise a name ending in `.tif` / `.tiff` (ignoring case, query
    /// string, and fragment) selects it too. `data:` URIs carry no file
    /// name and are judged by signature alone.
    #[must_use]
    pub fn select(source_name: Option<&str>, bytes: &[u8]) -> Self {
        if has_tiff_signature(bytes) || source_name.is_some_and(has_tiff_extension) {
            Self::LegacyTiff
        } else {
            Self::Standard
        }
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("Standard"),
            Self::LegacyTiff => f.write_str("LegacyTiff"),
        }
    }
}

/// Trait for decoding strategies.
///
/// Input: the raw source bytes. Output: a full-resolution RGBA raster.
pub trait ImageDecoder {
    /// Decode `bytes` into a raster.
    ///
    /// # Errors
    ///
    /// Returns a decode-class [`PipelineError`] if the bytes cannot be
    /// interpreted as an image this strategy supports.
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, PipelineError>;
}

impl ImageDecoder for DecoderKind {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        match *self {
            Self::Standard => decode_standard(bytes),
            Self::LegacyTiff if !has_tiff_signature(bytes) => {
                tracing::warn!(
                    "source named as TIFF has no TIFF signature, decoding as standard raster"
                );
                decode_standard(bytes)
            }
            Self::LegacyTiff => decode_legacy_tiff(bytes),
        }
    }
}

/// Decode a source whose decoder is chosen by [`DecoderKind::select`].
///
/// Returns the decoded raster and the strategy that produced it.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty,
/// [`PipelineError::ImageDecode`] if the format is unrecognized or the
/// data is corrupt, and [`PipelineError::LegacyTiff`] if the TIFF
/// fallback fails.
pub fn decode_source(
    bytes: &[u8],
    source_name: Option<&str>,
) -> Result<(RasterImage, DecoderKind), PipelineError> {
    let kind = DecoderKind::select(source_name, bytes);
    tracing::debug!(decoder = %kind, input_bytes = bytes.len(), "decoding source image");
    let image = kind.decode(bytes)?;
    Ok((image, kind))
}

fn decode_standard(bytes: &[u8]) -> Result<RasterImage, PipelineError> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgba8())
}

fn decode_legacy_tiff(bytes: &[u8]) -> Result<RasterImage, PipelineError> {
    let full = image::load_from_memory_with_format(bytes, image::ImageFormat::Tiff)
        .map_err(|e| PipelineError::LegacyTiff(e.to_string()))?;

    // Rasterize at 8 bits per channel, whatever the source depth was.
    let rasterized = full.to_rgba8();

    let png = crate::composite::encode_png(&rasterized)
        .map_err(|e| PipelineError::LegacyTiff(format!("PNG re-encode failed: {e}")))?;
    tracing::debug!(
        source_color = ?full.color(),
        png_bytes = png.len(),
        "legacy TIFF rasterized and re-encoded"
    );

    decode_standard(&png)
}

fn has_tiff_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(&TIFF_LE_MAGIC) || bytes.starts_with(&TIFF_BE_MAGIC)
}

fn has_tiff_extension(name: &str) -> bool {
    if name.trim_start().starts_with("data:") {
        return false;
    }
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".tif") || lower.ends_with(".tiff")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode(image: &image::DynamicImage, format: image::ImageFormat) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn small_png() -> Vec<u8> {
        let img = RasterImage::from_fn(3, 2, |x, y| {
            image::Rgba([
                u8::try_from(x * 80).unwrap(),
                u8::try_from(y * 100).unwrap(),
                7,
                255,
            ])
        });
        encode(
            &image::DynamicImage::ImageRgba8(img),
            image::ImageFormat::Png,
        )
    }

    #[test]
    fn select_standard_for_png_bytes() {
        let png = small_png();
        assert_eq!(DecoderKind::select(None, &png), DecoderKind::Standard);
        assert_eq!(
            DecoderKind::select(Some("scan.png"), &png),
            DecoderKind::Standard
        );
    }

    #[test]
    fn select_legacy_tiff_by_extension() {
        for name in [
            "fundus.tif",
            "FUNDUS.TIFF",
            "https://host/img/oct.tiff?token=abc",
            "/images/left.tif#frame1",
        ] {
            assert_eq!(
                DecoderKind::select(Some(name), &[1, 2, 3]),
                DecoderKind::LegacyTiff,
                "{name}"
            );
        }
    }

    #[test]
    fn data_uri_is_judged_by_signature_only() {
        assert_eq!(
            DecoderKind::select(Some("data:image/png;base64,xyz.tif"), &[1, 2, 3]),
            DecoderKind::Standard
        );
    }

    #[test]
    fn select_legacy_tiff_by_signature() {
        assert_eq!(
            DecoderKind::select(Some("upload.bin"), &[0x49, 0x49, 0x2A, 0x00, 8]),
            DecoderKind::LegacyTiff
        );
        assert_eq!(
            DecoderKind::select(None, &[0x4D, 0x4D, 0x00, 0x2A, 0]),
            DecoderKind::LegacyTiff
        );
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode_source(&[], None);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_return_image_decode_error() {
        let result = decode_source(&[0xFF, 0xFE, 0x00, 0x01], Some("x.png"));
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn corrupt_tiff_returns_legacy_tiff_error() {
        let result = decode_source(&[0x49, 0x49, 0x2A, 0x00, 0xFF], None);
        assert!(matches!(result, Err(PipelineError::LegacyTiff(_))));
    }

    #[test]
    fn misnamed_png_falls_back_to_standard_decode() {
        let (image, kind) = decode_source(&small_png(), Some("scan.tif")).unwrap();
        assert_eq!(kind, DecoderKind::LegacyTiff);
        assert_eq!(image.dimensions(), (3, 2));
    }

    #[test]
    fn standard_decode_preserves_pixels() {
        let (image, kind) = decode_source(&small_png(), Some("a.png")).unwrap();
        assert_eq!(kind, DecoderKind::Standard);
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1).0, [160, 100, 7, 255]);
    }

    #[test]
    fn sixteen_bit_tiff_is_rasterized_to_eight_bit() {
        let img = image::ImageBuffer::<image::Rgb<u16>, Vec<u16>>::from_fn(4, 3, |x, _| {
            if x < 2 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([u16::MAX, u16::MAX / 2, 0])
            }
        });
        let tiff = encode(
            &image::DynamicImage::ImageRgb16(img),
            image::ImageFormat::Tiff,
        );

        let (image, kind) = decode_source(&tiff, Some("legacy.tif")).unwrap();
        assert_eq!(kind, DecoderKind::LegacyTiff);
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
        let right = image.get_pixel(3, 2).0;
        assert_eq!(right[0], 255);
        assert!((126..=128).contains(&right[1]), "got {right:?}");
        assert_eq!(right[3], 255);
    }
}
