//! Filter diagnostics: timing and per-stage metrics.
//!
//! Every call to [`process`](crate::process) collects diagnostics
//! alongside the output; [`process_with_diagnostics`] returns them.
//!
//! Duration measurements use [`std::time::Duration`]. Timestamps come
//! from a [`Clock`]; the default [`WebClock`] is backed by the `web-time`
//! crate, which uses `performance.now()` on WASM and
//! `std::time::Instant` natively.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ProcessResult;
use crate::types::{Dimensions, FilterConfig, FilterMode, PipelineError, RasterImage};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single filter run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDiagnostics {
    /// Stage 0: source decoding.
    pub decode: StageDiagnostics,
    /// Stage 1: bounding to the maximum dimension.
    pub downsample: StageDiagnostics,
    /// Stage 2: the mode's transform (`None` for `Original`).
    pub transform: Option<StageDiagnostics>,
    /// Stage 3: PNG encoding.
    pub encode: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the run.
    pub summary: FilterSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Source decoding metrics.
    Decode {
        /// Size of the input bytes.
        input_bytes: usize,
        /// Decoder strategy that produced the raster.
        decoder: String,
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
    },
    /// Bounding metrics.
    Downsample {
        /// Longest-side bound.
        max_dimension: u32,
        /// Dimensions after bounding.
        width: u32,
        /// Dimensions after bounding.
        height: u32,
        /// Whether resampling ran.
        applied: bool,
    },
    /// Vessel mode metrics.
    Vessel {
        /// Gaussian sigma.
        sigma: f32,
        /// Largest raw vesselness score.
        max_score: f32,
        /// Mean Sobel gradient magnitude of the smoothed field.
        mean_gradient: f32,
        /// Pixels rendered as vessel.
        vessel_pixel_count: u64,
    },
    /// Optic disc mode metrics.
    Optic {
        /// Pixels classified as disc.
        disc_pixel_count: u64,
        /// Pixels classified as cup.
        cup_pixel_count: u64,
    },
    /// Heatmap mode metrics.
    Heatmap {
        /// Mean colormap position `t` over all pixels.
        mean_intensity: f32,
    },
    /// Encoding metrics.
    Encode {
        /// Size of the encoded PNG.
        output_bytes: usize,
    },
}

/// High-level summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSummary {
    /// Filter mode that ran.
    pub mode: FilterMode,
    /// Dimensions of the decoded source.
    pub source: Dimensions,
    /// Dimensions of the output.
    pub output: Dimensions,
}

impl FilterDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Filter Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Mode: {}  |  Source: {}  |  Output: {} ({} pixels)",
            self.summary.mode,
            self.summary.source,
            self.summary.output,
            self.summary.output.pixel_count(),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(72));

        let total_ms = duration_ms(self.total_duration);

        let mut stages: Vec<(&str, &StageDiagnostics)> =
            vec![("Decode", &self.decode), ("Downsample", &self.downsample)];
        if let Some(ref transform) = self.transform {
            stages.push(("Transform", transform));
        }
        stages.push(("Encode", &self.encode));

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            decoder,
            width,
            height,
        } => format!("{decoder} {input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Downsample {
            max_dimension,
            width,
            height,
            applied,
        } => {
            if *applied {
                format!("bound={max_dimension} -> {width}x{height}")
            } else {
                format!("bound={max_dimension} unchanged")
            }
        }
        StageMetrics::Vessel {
            sigma,
            max_score,
            mean_gradient,
            vessel_pixel_count,
        } => format!(
            "sigma={sigma:.2} max={max_score:.3} grad={mean_gradient:.2} vessels={vessel_pixel_count}"
        ),
        StageMetrics::Optic {
            disc_pixel_count,
            cup_pixel_count,
        } => format!("disc={disc_pixel_count} cup={cup_pixel_count}"),
        StageMetrics::Heatmap { mean_intensity } => format!("mean t={mean_intensity:.3}"),
        StageMetrics::Encode { output_bytes } => format!("{output_bytes} bytes PNG"),
    }
}

/// Run the mode's transform, returning the output and its metrics.
fn run_transform(
    image: &RasterImage,
    mode: FilterMode,
    config: &FilterConfig,
) -> Option<(RasterImage, StageMetrics)> {
    match mode {
        FilterMode::Original => None,
        FilterMode::Vessel => {
            let analysis = crate::vessel::analyze(image, &config.vessel);
            let output = crate::vessel::render(image, &analysis, &config.vessel);
            Some((
                output,
                StageMetrics::Vessel {
                    sigma: config.vessel.sigma,
                    max_score: analysis.max_score,
                    mean_gradient: analysis.mean_gradient,
                    vessel_pixel_count: analysis.vessel_pixel_count,
                },
            ))
        }
        FilterMode::Optic => {
            let analysis = crate::optic::analyze(image, &config.optic);
            let output = crate::optic::render(image, &analysis, &config.optic);
            Some((
                output,
                StageMetrics::Optic {
                    disc_pixel_count: analysis.disc_pixel_count,
                    cup_pixel_count: analysis.cup_pixel_count,
                },
            ))
        }
        FilterMode::Xai => {
            let mean_intensity = crate::channel::luminance_field(image).mean() / 255.0;
            Some((
                crate::heatmap::heatmap_filter(image),
                StageMetrics::Heatmap { mean_intensity },
            ))
        }
    }
}

/// Decode, bound, filter, and encode a source image, collecting
/// per-stage diagnostics.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an unusable config, a
/// decode-class error if the source cannot be decoded, and
/// [`PipelineError::Encode`] if the output cannot be encoded.
pub fn process_with_diagnostics<C: Clock>(
    bytes: &[u8],
    source_name: Option<&str>,
    mode: FilterMode,
    config: &FilterConfig,
    clock: &C,
) -> Result<(ProcessResult, FilterDiagnostics), PipelineError> {
    config.validate()?;
    let start = clock.now();

    let t = clock.now();
    let (decoded, decoder) = crate::decode::decode_source(bytes, source_name)?;
    let source = Dimensions::of(&decoded);
    let decode = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Decode {
            input_bytes: bytes.len(),
            decoder: decoder.to_string(),
            width: source.width,
            height: source.height,
        },
    };

    let t = clock.now();
    let (bounded, applied) =
        crate::downsample::downsample(&decoded, config.max_dimension, config.downsample_filter);
    let bounded_dims = Dimensions::of(&bounded);
    let downsample = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Downsample {
            max_dimension: config.max_dimension,
            width: bounded_dims.width,
            height: bounded_dims.height,
            applied,
        },
    };
    drop(decoded);

    let t = clock.now();
    let (output, transform) = match run_transform(&bounded, mode, config) {
        Some((output, metrics)) => (
            output,
            Some(StageDiagnostics {
                duration: clock.elapsed(&t),
                metrics,
            }),
        ),
        None => (bounded, None),
    };

    let t = clock.now();
    let encoded = crate::composite::composite(&output)?;
    let encode = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Encode {
            output_bytes: encoded.bytes.len(),
        },
    };

    let diagnostics = FilterDiagnostics {
        decode,
        downsample,
        transform,
        encode,
        total_duration: clock.elapsed(&start),
        summary: FilterSummary {
            mode,
            source,
            output: encoded.dimensions,
        },
    };
    tracing::debug!(
        mode = %mode,
        total_ms = duration_ms(diagnostics.total_duration),
        "filter run complete"
    );

    let result = ProcessResult {
        mode,
        decoder,
        source_dimensions: source,
        image: output,
        encoded,
    };
    Ok((result, diagnostics))
}
