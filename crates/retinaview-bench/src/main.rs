//! retinaview-bench: CLI tool for filter parameter experimentation and diagnostics.
//!
//! Runs one filter mode over an image file with configurable parameters,
//! printing per-stage timings and metrics. Useful for:
//!
//! - Tuning the vesselness sigma and thresholds on real fundus images
//! - Checking which pixels the optic disc heuristic picks up
//! - Measuring per-stage durations to identify bottlenecks
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin retinaview-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Logging goes to stderr and honors `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use retinaview_pipeline::diagnostics::{Clock, FilterDiagnostics};
use retinaview_pipeline::{DownsampleFilter, FilterConfig, FilterMode, OpticParams, VesselParams};

/// Filter parameter experimentation and diagnostics for retinaview.
#[derive(Parser)]
#[command(name = "retinaview-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP, TIFF).
    image_path: PathBuf,

    /// Filter mode (original, vessel, optic, xai).
    #[arg(long, default_value_t = FilterMode::Vessel)]
    mode: FilterMode,

    /// Longest-side bound in pixels.
    #[arg(
        long,
        default_value_t = FilterConfig::DEFAULT_MAX_DIMENSION,
        value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..),
    )]
    max_dimension: u32,

    /// Downsample filter (nearest, triangle, catmull-rom, gaussian, lanczos3).
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    downsample_filter: Filter,

    /// Gaussian sigma of the vessel filter.
    #[arg(long, default_value_t = VesselParams::DEFAULT_SIGMA)]
    vessel_sigma: f32,

    /// Blob-ness sensitivity of the vessel filter.
    #[arg(long, default_value_t = VesselParams::DEFAULT_BETA)]
    vessel_beta: f32,

    /// Structure sensitivity of the vessel filter.
    #[arg(long, default_value_t = VesselParams::DEFAULT_C)]
    vessel_c: f32,

    /// Normalized score above which a pixel renders as vessel.
    #[arg(long, default_value_t = VesselParams::DEFAULT_SCORE_THRESHOLD)]
    vessel_threshold: f32,

    /// Luminance above which any pixel is optic disc.
    #[arg(long, default_value_t = OpticParams::DEFAULT_BRIGHT_THRESHOLD)]
    optic_bright_threshold: f32,

    /// Disc radius as a fraction of the shorter side.
    #[arg(long, default_value_t = OpticParams::DEFAULT_RADIUS_FRACTION)]
    optic_radius_fraction: f32,

    /// Write the output PNG to this path (first run only).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..),
    )]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full filter config as a JSON string.
    ///
    /// When provided, all other parameter flags except `--mode` are
    /// ignored. Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Downsample resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Filter> for DownsampleFilter {
    fn from(f: Filter) -> Self {
        match f {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

const fn filter_from_pipeline(f: DownsampleFilter) -> Filter {
    match f {
        DownsampleFilter::Nearest => Filter::Nearest,
        DownsampleFilter::Triangle => Filter::Triangle,
        DownsampleFilter::CatmullRom => Filter::CatmullRom,
        DownsampleFilter::Gaussian => Filter::Gaussian,
        DownsampleFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// Tracks [`FilterConfig::DEFAULT_DOWNSAMPLE_FILTER`].
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(FilterConfig::DEFAULT_DOWNSAMPLE_FILTER);

/// Build a [`FilterConfig`] from CLI arguments.
fn config_from_cli(cli: &Cli) -> Result<FilterConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(FilterConfig {
        max_dimension: cli.max_dimension,
        downsample_filter: cli.downsample_filter.into(),
        vessel: VesselParams {
            sigma: cli.vessel_sigma,
            beta: cli.vessel_beta,
            c: cli.vessel_c,
            score_threshold: cli.vessel_threshold,
            ..VesselParams::default()
        },
        optic: OpticParams {
            bright_threshold: cli.optic_bright_threshold,
            radius_fraction: cli.optic_radius_fraction,
            ..OpticParams::default()
        },
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            tracing::error!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let source_name = cli.image_path.to_str();

    tracing::info!(
        image = %cli.image_path.display(),
        bytes = image_bytes.len(),
        mode = %cli.mode,
        runs = cli.runs,
        "starting"
    );
    tracing::debug!(?config, "filter config");

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            tracing::info!("run {}/{}", run + 1, cli.runs);
        }

        match retinaview_pipeline::process_with_diagnostics(
            &image_bytes,
            source_name,
            cli.mode,
            &config,
            &StdClock,
        ) {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            tracing::error!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                if run == 0
                    && let Some(ref out_path) = cli.out
                {
                    match std::fs::write(out_path, &result.encoded.bytes) {
                        Ok(()) => tracing::info!(
                            "PNG written to {} ({} bytes, {})",
                            out_path.display(),
                            result.encoded.bytes.len(),
                            result.encoded.dimensions,
                        ),
                        Err(e) => {
                            tracing::error!("Error writing PNG to {}: {e}", out_path.display());
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                tracing::error!(kind = ?e.failure_kind(), "Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Extracts one stage duration from diagnostics.
type StageExtractor = fn(&FilterDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[FilterDiagnostics]) {
    if all_diagnostics.is_empty() {
        return;
    }

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(30));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| Some(d.decode.duration)),
        ("Downsample", |d| Some(d.downsample.duration)),
        ("Transform", |d| d.transform.as_ref().map(|s| s.duration)),
        ("Encode", |d| Some(d.encode.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
