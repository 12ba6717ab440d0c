//! Integration tests: end-to-end filter behavior on synthesized images.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use retinaview_pipeline::{
    Commit, DecoderKind, Dimensions, DownsampleFilter, FilterConfig, FilterMode, ImageSlot,
    RasterImage, ViewSession, composite, load, process,
};

fn png(image: &RasterImage) -> Vec<u8> {
    composite::encode_png(image).unwrap()
}

/// A fundus-like test card: warm background, a brighter disc left of
/// center, and a few dark vessel-like lines.
fn fundus_card(width: u32, height: u32) -> RasterImage {
    let (cx, cy) = (f64::from(width) * 0.4, f64::from(height) * 0.5);
    let radius = f64::from(width.min(height)) * 0.12;
    RasterImage::from_fn(width, height, |x, y| {
        let d = (f64::from(x) - cx).hypot(f64::from(y) - cy);
        if d < radius {
            image::Rgba([250, 235, 190, 255])
        } else if x % 23 < 2 || y % 31 < 2 {
            image::Rgba([120, 50, 30, 255])
        } else {
            image::Rgba([200, 110, 60, 255])
        }
    })
}

#[test]
fn every_mode_is_bit_reproducible() {
    let bytes = png(&fundus_card(120, 90));
    let config = FilterConfig::default();
    for mode in FilterMode::ALL {
        let first = process(&bytes, None, mode, &config).expect("first run");
        let second = process(&bytes, None, mode, &config).expect("second run");
        assert_eq!(first.encoded.bytes, second.encoded.bytes, "{mode} differs");
    }
}

#[test]
fn every_mode_preserves_loaded_dimensions() {
    let bytes = png(&fundus_card(97, 61));
    let config = FilterConfig::default();
    let loaded = load(&bytes, None, &config).unwrap();
    for mode in FilterMode::ALL {
        let result = process(&bytes, None, mode, &config).unwrap();
        assert_eq!(
            result.encoded.dimensions,
            Dimensions::of(&loaded.image),
            "{mode}"
        );
    }
}

#[test]
fn landscape_source_is_bounded_to_600() {
    let bytes = png(&fundus_card(1024, 768));
    let result = process(&bytes, None, FilterMode::Vessel, &FilterConfig::default()).unwrap();
    assert_eq!(
        result.source_dimensions,
        Dimensions {
            width: 1024,
            height: 768
        }
    );
    assert_eq!(
        result.encoded.dimensions,
        Dimensions {
            width: 600,
            height: 450
        }
    );
}

#[test]
fn every_downsample_filter_honors_the_bound() {
    let bytes = png(&fundus_card(1024, 768));
    for filter in DownsampleFilter::ALL {
        let config = FilterConfig {
            downsample_filter: filter,
            ..FilterConfig::default()
        };
        let result = process(&bytes, None, FilterMode::Vessel, &config).unwrap();
        let Dimensions { width, height } = result.encoded.dimensions;
        assert_eq!(width.max(height), 600, "{filter}");
    }
}

#[test]
fn config_json_cannot_skip_the_bound() {
    let parsed = serde_json::from_str::<FilterConfig>(r#"{"downsample_filter":"Disabled"}"#);
    assert!(parsed.is_err());
}

#[test]
fn portrait_source_keeps_aspect_ratio() {
    let bytes = png(&fundus_card(500, 1200));
    let loaded = load(&bytes, None, &FilterConfig::default()).unwrap();
    let (w, h) = loaded.image.dimensions();
    assert_eq!(h, 600);
    // 500 / 1200 * 600 = 250.
    assert!(w.abs_diff(250) <= 1, "width {w}");
}

#[test]
fn heatmap_maps_black_and_white_to_the_colormap_ends() {
    let img = RasterImage::from_fn(4, 2, |x, _| {
        if x < 2 {
            image::Rgba([0, 0, 0, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    });
    let result = process(&png(&img), None, FilterMode::Xai, &FilterConfig::default()).unwrap();
    assert_eq!(result.image.get_pixel(0, 0).0, [0, 0, 255, 255]);
    assert_eq!(result.image.get_pixel(3, 1).0, [255, 0, 0, 255]);
}

#[test]
fn dark_line_renders_as_vessel_on_dimmed_background() {
    let img = RasterImage::from_fn(40, 40, |x, _| {
        if x == 19 || x == 20 {
            image::Rgba([60, 40, 30, 255])
        } else {
            image::Rgba([220, 200, 150, 255])
        }
    });
    let config = FilterConfig::default();
    let result = process(&png(&img), None, FilterMode::Vessel, &config).unwrap();

    for y in 2..38 {
        for x in [19, 20] {
            let [r, g, b, _] = result.image.get_pixel(x, y).0;
            assert!(g > r && g > b, "({x}, {y}) = {:?} not tinted", [r, g, b]);
        }
        for x in [5, 10, 24, 30] {
            let [r, g, b, _] = result.image.get_pixel(x, y).0;
            assert!(r == g && g == b, "({x}, {y}) = {:?} not gray", [r, g, b]);
        }
    }
}

#[test]
fn original_mode_returns_loaded_source() {
    let bytes = png(&fundus_card(80, 60));
    let config = FilterConfig::default();
    let loaded = load(&bytes, None, &config).unwrap();
    let result = process(&bytes, None, FilterMode::Original, &config).unwrap();
    assert_eq!(result.image, loaded.image);
}

#[test]
fn legacy_tiff_scan_is_rasterized() {
    let scan = image::ImageBuffer::<image::Luma<u16>, _>::from_fn(64, 48, |x, y| {
        image::Luma([u16::try_from((x + y) * 500).unwrap()])
    });
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma16(scan)
        .write_to(&mut buf, image::ImageFormat::Tiff)
        .unwrap();

    let result = process(
        buf.get_ref(),
        Some("https://example.org/scans/oct_0042.TIFF"),
        FilterMode::Xai,
        &FilterConfig::default(),
    )
    .unwrap();
    assert_eq!(result.decoder, DecoderKind::LegacyTiff);
    assert_eq!(result.image.dimensions(), (64, 48));
}

#[test]
fn stale_vessel_result_never_replaces_optic() {
    let bytes = png(&fundus_card(60, 40));
    let config = FilterConfig::default();

    let mut session = ViewSession::new();
    let load_id = session.begin_load(ImageSlot::Fundus);
    let source = process(&bytes, None, FilterMode::Original, &config).unwrap();
    let (commit, request) = session.finish_load(load_id, Ok(source.encoded));
    assert_eq!(commit, Commit::Applied);
    assert!(request.is_none());

    let vessel = session.set_mode(FilterMode::Vessel).unwrap();
    let optic = session.set_mode(FilterMode::Optic).unwrap();

    let optic_out = process(&bytes, None, optic.mode, &config).unwrap().encoded;
    let vessel_out = process(&bytes, None, vessel.mode, &config).unwrap().encoded;

    let optic_commit = session.finish_filter(optic.id, Ok(optic_out.clone()));
    assert_eq!(optic_commit, Commit::Applied);
    let vessel_commit = session.finish_filter(vessel.id, Ok(vessel_out));
    assert_eq!(vessel_commit, Commit::Discarded);
    assert_eq!(session.displayed(), Some(&optic_out));
}
