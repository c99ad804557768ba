//! Batch result records.
//!
//! One [`CaseResult`] per successfully staged photograph, in input
//! order. Photographs that could not be read are recorded separately as
//! [`CaseFailure`]s and never produce a `CaseResult`.

use serde::{Deserialize, Serialize};

use crate::classify::StageScore;
use crate::pipeline::CaseOutcome;
use crate::review::ReviewDecision;
use crate::types::BoundingBox;

/// Where the visual artifacts for one case were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Grayscale mask image.
    pub mask: String,
    /// Red overlay image.
    pub overlay: String,
    /// ROI crop.
    pub roi: String,
}

/// Final per-image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Source photograph path.
    pub file: String,
    /// Top-1 stage label.
    pub pred_stage: String,
    /// Top-1 probability.
    pub confidence: f32,
    /// Wound area as a fraction of the image.
    pub area_ratio: f64,
    /// Padded ROI box in source pixel coordinates.
    pub roi_bbox: BoundingBox,
    /// Review verdict (`review_needed`, `review_reasons`).
    #[serde(flatten)]
    pub review: ReviewDecision,
    /// Mask image path.
    pub mask_path: String,
    /// Overlay image path.
    pub overlay_path: String,
    /// ROI crop path.
    pub roi_path: String,
    /// The two highest-ranked stages.
    pub top2: Vec<StageScore>,
}

impl CaseResult {
    /// Build the record for `file` from its pipeline outcome and the
    /// paths its artifacts were written to.
    #[must_use]
    pub fn new(file: impl Into<String>, outcome: &CaseOutcome, artifacts: ArtifactPaths) -> Self {
        let top1 = outcome.classification.top1();
        Self {
            file: file.into(),
            pred_stage: top1.stage.clone(),
            confidence: top1.prob,
            area_ratio: outcome.area_ratio,
            roi_bbox: outcome.roi_bbox,
            review: outcome.review.clone(),
            mask_path: artifacts.mask,
            overlay_path: artifacts.overlay,
            roi_path: artifacts.roi,
            top2: outcome.classification.top2(),
        }
    }
}

/// A photograph that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFailure {
    /// Source photograph path.
    pub file: String,
    /// Why it was skipped.
    pub error: String,
}

/// Collected output of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Staged photographs, in input order.
    pub results: Vec<CaseResult>,
    /// Skipped photographs, in input order.
    pub failures: Vec<CaseFailure>,
}

impl BatchOutcome {
    /// Number of photographs flagged for review.
    #[must_use]
    pub fn review_count(&self) -> usize {
        self.results.iter().filter(|r| r.review.review_needed()).count()
    }
}

/// Accumulates results as a batch progresses.
#[derive(Debug, Default)]
pub struct BatchAggregator {
    outcome: BatchOutcome,
}

impl BatchAggregator {
    /// Empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a staged photograph.
    pub fn push_result(&mut self, result: CaseResult) {
        self.outcome.results.push(result);
    }

    /// Record a skipped photograph.
    pub fn push_failure(&mut self, file: impl Into<String>, error: impl std::fmt::Display) {
        self.outcome.failures.push(CaseFailure {
            file: file.into(),
            error: error.to_string(),
        });
    }

    /// Finish the batch.
    #[must_use]
    pub fn finish(self) -> BatchOutcome {
        self.outcome
    }
}
