//! woundstage: batch staging of wound photographs.
//!
//! Segments the wound in each photograph, crops a padded region of
//! interest around it, classifies the crop into a pressure-injury stage,
//! and flags cases that need clinician review. Per-case masks, overlays,
//! and crops plus `results.csv` / `results.json` are written to the run
//! directory.
//!
//! # Usage
//!
//! ```text
//! woundstage --input photos/ --seg-model seg.json --cls-model cls.json [OPTIONS]
//! ```
//!
//! Set `RUST_LOG` to change log verbosity (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant, SystemTime};

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use woundstage_io::{
    ArtifactWriter, BatchRunner, DEFAULT_RUNS_DIR, RtenClassifier, RtenSegmenter,
    discover_inputs, run_directory, write_reports,
};
use woundstage_pipeline::diagnostics::Clock;
use woundstage_pipeline::{
    BatchOutcome, DecodeMode, Device, PipelineConfig, SegmentationModel, StageClassifier,
};

/// Stage wound photographs with a segmenter and a stage classifier.
#[derive(Parser)]
#[command(name = "woundstage", version)]
struct Cli {
    /// Image file or directory of images (PNG, JPEG, BMP, WebP).
    #[arg(long)]
    input: PathBuf,

    /// Run directory. Defaults to `runs/run_<unix-seconds>`.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Segmentation model descriptor (JSON).
    #[arg(long)]
    seg_model: PathBuf,

    /// Stage classifier descriptor (JSON).
    #[arg(long)]
    cls_model: PathBuf,

    /// Probability threshold for a mask pixel to count as wound.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MASK_THRESHOLD)]
    mask_thresh: f32,

    /// ROI padding as a fraction of the wound bounding box.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_PAD_RATIO)]
    pad: f64,

    /// Top-1 probability below which a case is flagged for review.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CONFIDENCE_THRESHOLD)]
    conf_thresh: f32,

    /// Wound area fraction below which a case is flagged for review.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_AREA_RATIO)]
    min_area_ratio: f64,

    /// Overlay blend factor (0 = photo only, 1 = solid mask colour).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OVERLAY_ALPHA)]
    overlay_alpha: f32,

    /// Ignore EXIF orientation when decoding.
    #[arg(long)]
    no_exif: bool,

    /// Compute device for model inference.
    #[arg(long, value_enum, default_value_t = DeviceArg::Cpu)]
    device: DeviceArg,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Print per-case stage timings.
    #[arg(long)]
    diagnostics: bool,

    /// Print the batch outcome as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

/// Compute device selection.
#[derive(Clone, Copy, ValueEnum)]
enum DeviceArg {
    /// Sequential CPU execution.
    Cpu,
    /// Accelerator if the backend has one, CPU otherwise.
    Accelerator,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        PipelineConfig {
            mask_threshold: cli.mask_thresh,
            pad_ratio: cli.pad,
            confidence_threshold: cli.conf_thresh,
            min_area_ratio: cli.min_area_ratio,
            decode_mode: if cli.no_exif {
                DecodeMode::Raw
            } else {
                DecodeMode::ExifAware
            },
            overlay_alpha: cli.overlay_alpha,
            device: match cli.device {
                DeviceArg::Cpu => Device::Cpu,
                DeviceArg::Accelerator => Device::Accelerator,
            },
        }
    };
    config.validate().map_err(|e| format!("Invalid configuration: {e}"))?;
    Ok(config)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let segmenter = match RtenSegmenter::load(&cli.seg_model) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let classifier = match RtenClassifier::load(&cli.cls_model) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        segmenter = %segmenter.descriptor().architecture,
        classifier = %classifier.descriptor().architecture,
        stages = ?classifier.descriptor().labels,
        decode_mode = ?config.decode_mode,
        device = ?config.device,
        "models ready"
    );

    let out = cli
        .out
        .clone()
        .unwrap_or_else(|| run_directory(Path::new(DEFAULT_RUNS_DIR), SystemTime::now()));
    let mut writer = match ArtifactWriter::create(&out) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let inputs = discover_inputs(&cli.input);
    info!(input = %cli.input.display(), count = inputs.len(), "discovered inputs");

    let runner = BatchRunner::new(&segmenter, &classifier, config);
    let result = if cli.diagnostics {
        runner
            .run_with_diagnostics(&inputs, &mut writer, &StdClock)
            .map(|(outcome, diagnostics)| {
                for (file, diag) in &diagnostics {
                    println!("{file}\n{}\n", diag.report());
                }
                outcome
            })
    } else {
        runner.run(&inputs, &mut writer)
    };
    let outcome = match result {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let reports = match write_reports(writer.root(), &outcome.results) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing results: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&outcome);
        println!("Results: {}", reports.csv.display());
        println!("         {}", reports.json.display());
    }

    ExitCode::SUCCESS
}

/// Print one line per case plus totals.
fn print_summary(outcome: &BatchOutcome) {
    for r in &outcome.results {
        let flag = if r.review.review_needed() {
            let reasons: Vec<&str> = r.review.reasons().iter().map(|x| x.as_str()).collect();
            format!("  REVIEW ({})", reasons.join(", "))
        } else {
            String::new()
        };
        println!("{:<40} {:<10} {:>6.3}{flag}", r.file, r.pred_stage, r.confidence);
    }
    for f in &outcome.failures {
        println!("{:<40} skipped: {}", f.file, f.error);
    }
    println!(
        "\nStaged {}, skipped {}, flagged for review {}",
        outcome.results.len(),
        outcome.failures.len(),
        outcome.review_count(),
    );
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
