//! woundstage-pipeline: wound photograph staging pipeline (sans-IO).
//!
//! Takes a wound photograph and two trained models and produces a stage
//! prediction with a review verdict:
//! decode -> segment -> keep largest region -> padded ROI ->
//! classify -> review -> render mask and overlay.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! bytes and images and borrows models through the traits in
//! [`model`]. Filesystem access, checkpoint loading, and batch
//! traversal live in `woundstage-io`.

pub mod aggregate;
pub mod classify;
pub mod decode;
pub mod diagnostics;
pub mod mask;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod resize;
pub mod review;
pub mod roi;
pub mod segment;
pub mod types;

pub use aggregate::{ArtifactPaths, BatchAggregator, BatchOutcome, CaseFailure, CaseResult};
pub use classify::{ClassificationResult, StageScore};
pub use mask::Mask;
pub use model::{Device, ModelDescriptor, ModelError, SegmentationModel, StageClassifier};
pub use pipeline::{CaseOutcome, Pipeline};
pub use review::{ReviewDecision, ReviewReason};
pub use types::{BoundingBox, DecodeMode, Dimensions, PipelineConfig, PipelineError};

/// Stage one decoded photograph end to end.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// validation and [`PipelineError::Model`] if either model fails.
/// An empty segmentation is not an error.
pub fn process_image(
    image: types::RgbImage,
    segmenter: &dyn SegmentationModel,
    classifier: &dyn StageClassifier,
    config: &PipelineConfig,
) -> Result<CaseOutcome, PipelineError> {
    config.validate()?;
    Ok(Pipeline::from_image(image, config.clone())
        .segment(segmenter)?
        .select_roi()
        .classify(classifier)?
        .review()
        .into_outcome())
}

/// Decode and stage one photograph from raw bytes.
///
/// # Errors
///
/// Same as [`process_image`], plus [`PipelineError::EmptyInput`] and
/// [`PipelineError::ImageDecode`] for unreadable bytes.
pub fn process(
    image_bytes: &[u8],
    segmenter: &dyn SegmentationModel,
    classifier: &dyn StageClassifier,
    config: &PipelineConfig,
) -> Result<CaseOutcome, PipelineError> {
    config.validate()?;
    let image = decode::decode_rgb(image_bytes, config.decode_mode)?;
    process_image(image, segmenter, classifier, config)
}
