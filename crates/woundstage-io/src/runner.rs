//! Sequential batch orchestration.
//!
//! For each input, in order: load, stage, write artifacts, record the
//! result. A photograph that cannot be read is logged, recorded as a
//! [`CaseFailure`](woundstage_pipeline::CaseFailure), and skipped.
//! Model failures and write failures abort the batch.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use woundstage_pipeline::diagnostics::{CaseDiagnostics, Clock, process_image_with_diagnostics};
use woundstage_pipeline::types::RgbImage;
use woundstage_pipeline::{
    BatchAggregator, BatchOutcome, CaseOutcome, CaseResult, PipelineConfig, PipelineError,
    SegmentationModel, StageClassifier,
};

use crate::artifacts::{ArtifactWriter, WriteError};
use crate::load::load_image;

/// Errors that abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The configuration was rejected before any input was touched.
    #[error(transparent)]
    Config(PipelineError),

    /// Staging a readable photograph failed.
    #[error("failed to stage {}: {source}", path.display())]
    Pipeline {
        /// Photograph being staged.
        path: PathBuf,
        /// Underlying error.
        source: PipelineError,
    },

    /// Writing artifacts failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Runs the pipeline over a list of photographs with shared models.
pub struct BatchRunner<'a> {
    segmenter: &'a dyn SegmentationModel,
    classifier: &'a dyn StageClassifier,
    config: PipelineConfig,
}

impl<'a> BatchRunner<'a> {
    /// Create a runner. Models are borrowed for the whole batch.
    #[must_use]
    pub const fn new(
        segmenter: &'a dyn SegmentationModel,
        classifier: &'a dyn StageClassifier,
        config: PipelineConfig,
    ) -> Self {
        Self {
            segmenter,
            classifier,
            config,
        }
    }

    /// Stage every path in `inputs`, writing artifacts through `writer`.
    ///
    /// An empty `inputs` list returns an empty outcome.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError`] for an invalid config, a model failure, or
    /// an artifact write failure. Unreadable photographs are not errors.
    pub fn run(&self, inputs: &[PathBuf], writer: &mut ArtifactWriter) -> Result<BatchOutcome, BatchError> {
        self.run_inner(inputs, writer, |_, image| {
            woundstage_pipeline::process_image(image, self.segmenter, self.classifier, &self.config)
        })
    }

    /// Like [`run`](Self::run), also collecting per-case stage timings.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn run_with_diagnostics<C: Clock>(
        &self,
        inputs: &[PathBuf],
        writer: &mut ArtifactWriter,
        clock: &C,
    ) -> Result<(BatchOutcome, Vec<(String, CaseDiagnostics)>), BatchError> {
        let mut diagnostics = Vec::new();
        let outcome = self.run_inner(inputs, writer, |path, image| {
            let (outcome, diag) = process_image_with_diagnostics(
                image,
                self.segmenter,
                self.classifier,
                &self.config,
                clock,
            )?;
            diagnostics.push((path.display().to_string(), diag));
            Ok(outcome)
        })?;
        Ok((outcome, diagnostics))
    }

    fn run_inner<F>(
        &self,
        inputs: &[PathBuf],
        writer: &mut ArtifactWriter,
        mut stage: F,
    ) -> Result<BatchOutcome, BatchError>
    where
        F: FnMut(&Path, RgbImage) -> Result<CaseOutcome, PipelineError>,
    {
        self.config.validate().map_err(BatchError::Config)?;

        let mut aggregator = BatchAggregator::new();
        let total = inputs.len();
        for (index, path) in inputs.iter().enumerate() {
            let image = match load_image(path, self.config.decode_mode) {
                Ok(image) => image,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable image");
                    aggregator.push_failure(path.display().to_string(), &e);
                    continue;
                }
            };

            let outcome = stage(path, image).map_err(|source| BatchError::Pipeline {
                path: path.clone(),
                source,
            })?;
            let artifacts = writer.write(path, &outcome)?;
            let result = CaseResult::new(path.display().to_string(), &outcome, artifacts);
            info!(
                item = index + 1,
                total,
                file = %path.display(),
                stage = %result.pred_stage,
                confidence = result.confidence,
                review_needed = result.review.review_needed(),
                "staged"
            );
            aggregator.push_result(result);
        }

        let outcome = aggregator.finish();
        info!(
            staged = outcome.results.len(),
            skipped = outcome.failures.len(),
            needs_review = outcome.review_count(),
            "batch complete"
        );
        Ok(outcome)
    }
}
