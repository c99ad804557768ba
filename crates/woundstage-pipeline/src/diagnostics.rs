//! Per-case diagnostics: timing and counts for each pipeline stage.
//!
//! Timing goes through the [`Clock`] trait so this crate stays free of
//! platform time sources; the CLI supplies an [`std::time::Instant`]
//! backed implementation.
//!
//! Durations are serialized as fractional seconds (`f64`) since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{SegmentationModel, StageClassifier};
use crate::pipeline::{CaseOutcome, Pipeline};
use crate::types::{PipelineConfig, PipelineError, RgbImage};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Monotonic time source.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics for one staged photograph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDiagnostics {
    /// Wound segmentation.
    pub segment: StageDiagnostics,
    /// ROI derivation.
    pub roi: StageDiagnostics,
    /// Stage classification.
    pub classify: StageDiagnostics,
    /// Review policy plus mask and overlay rendering.
    pub review: StageDiagnostics,
    /// Total wall-clock duration.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
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
    /// Segmentation metrics.
    Segment {
        /// Model input resolution.
        input_size: u32,
        /// Foreground pixels after thresholding.
        raw_foreground: u64,
        /// Foreground pixels after keeping the largest component.
        foreground: u64,
        /// Final mask area ratio.
        area_ratio: f64,
    },
    /// ROI metrics.
    Roi {
        /// ROI width in pixels.
        width: u32,
        /// ROI height in pixels.
        height: u32,
        /// Whether the full-image fallback was used.
        fallback: bool,
    },
    /// Classification metrics.
    Classify {
        /// Model input resolution.
        input_size: u32,
        /// Top-1 label.
        top1: String,
        /// Top-1 probability.
        confidence: f32,
    },
    /// Review metrics.
    Review {
        /// Number of review reasons that fired.
        reason_count: usize,
    },
}

impl CaseDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = vec![
            format!("Case Diagnostics\n{}", "=".repeat(60)),
            format!("Total duration: {:.3}ms", duration_ms(self.total_duration)),
            String::new(),
            format!("{:<16} {:>10} {:>10}  {}", "Stage", "Duration", "% Total", "Details"),
            "-".repeat(72),
        ];

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in [
            ("Segment", &self.segment),
            ("ROI", &self.roi),
            ("Classify", &self.classify),
            ("Review", &self.review),
        ] {
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

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Segment {
            input_size,
            raw_foreground,
            foreground,
            area_ratio,
        } => format!(
            "{input_size}px input, {raw_foreground}->{foreground} px ({:.2}%)",
            area_ratio * 100.0
        ),
        StageMetrics::Roi {
            width,
            height,
            fallback,
        } => {
            if *fallback {
                format!("{width}x{height} (full image)")
            } else {
                format!("{width}x{height}")
            }
        }
        StageMetrics::Classify {
            input_size,
            top1,
            confidence,
        } => format!("{input_size}px input, {top1} ({confidence:.3})"),
        StageMetrics::Review { reason_count } => format!("{reason_count} reason(s)"),
    }
}

/// Stage one decoded photograph, timing each stage with `clock`.
///
/// Produces the same [`CaseOutcome`] as [`crate::process_image`].
///
/// # Errors
///
/// Same as [`crate::process_image`].
pub fn process_image_with_diagnostics<C: Clock>(
    image: RgbImage,
    segmenter: &dyn SegmentationModel,
    classifier: &dyn StageClassifier,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(CaseOutcome, CaseDiagnostics), PipelineError> {
    config.validate()?;
    let total_start = clock.now();

    let start = clock.now();
    let segmented = Pipeline::from_image(image, config.clone()).segment(segmenter)?;
    let seg = segmented.segmentation();
    let segment = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Segment {
            input_size: segmenter.descriptor().input_size,
            raw_foreground: seg.raw_mask.foreground_count(),
            foreground: seg.mask.foreground_count(),
            area_ratio: seg.area_ratio,
        },
    };

    let start = clock.now();
    let selected = segmented.select_roi();
    let sel = selected.selection();
    let roi = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Roi {
            width: sel.roi.width(),
            height: sel.roi.height(),
            fallback: sel.mask_was_empty,
        },
    };

    let start = clock.now();
    let classified = selected.classify(classifier)?;
    let top1 = classified.classification().top1();
    let classify = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Classify {
            input_size: classifier.descriptor().input_size,
            top1: top1.stage.clone(),
            confidence: top1.prob,
        },
    };

    let start = clock.now();
    let outcome = classified.review().into_outcome();
    let review = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Review {
            reason_count: outcome.review.reasons().len(),
        },
    };

    let diagnostics = CaseDiagnostics {
        segment,
        roi,
        classify,
        review,
        total_duration: clock.elapsed(&total_start),
    };
    Ok((outcome, diagnostics))
}
