//! Incremental pipeline: advance one case stage-by-stage, inspecting
//! each intermediate result before continuing.
//!
//! ```rust
//! # use woundstage_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # use woundstage_pipeline::model::{SegmentationModel, StageClassifier};
//! # fn run(
//! #     jpeg: Vec<u8>,
//! #     segmenter: &dyn SegmentationModel,
//! #     classifier: &dyn StageClassifier,
//! # ) -> Result<(), PipelineError> {
//! let outcome = Pipeline::new(jpeg, PipelineConfig::default())
//!     .decode()?
//!     .segment(segmenter)?
//!     .select_roi()
//!     .classify(classifier)?
//!     .review()
//!     .into_outcome();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying everything computed so far, so stages cannot be skipped or
//! reordered. Callers that already hold decoded pixels can start at
//! [`Pipeline::from_image`].

use tracing::debug;

use crate::classify::{self, ClassificationResult};
use crate::mask::Mask;
use crate::model::{SegmentationModel, StageClassifier};
use crate::overlay;
use crate::review::{self, ReviewDecision};
use crate::roi::{self, RoiSelection};
use crate::segment::{self, Segmentation};
use crate::types::{BoundingBox, Dimensions, GrayImage, PipelineConfig, PipelineError, RgbImage};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing, call .decode() to continue"]
pub struct Pending {
    config: PipelineConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Decode the source bytes according to `config.decode_mode`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if the source bytes are
    /// empty and [`PipelineError::ImageDecode`] if they are not a
    /// supported image.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        let image = crate::decode::decode_rgb(&self.source, self.config.decode_mode)?;
        Ok(Decoded {
            config: self.config,
            image,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state holding the oriented RGB photograph.
#[must_use = "pipeline stages are consumed by advancing, call .segment() to continue"]
pub struct Decoded {
    config: PipelineConfig,
    image: RgbImage,
}

impl Decoded {
    /// The decoded photograph.
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Segment the wound with `model` at the model's input size.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Model`] if the model call fails or
    /// returns a malformed logit map.
    pub fn segment(self, model: &dyn SegmentationModel) -> Result<Segmented, PipelineError> {
        let segmentation = segment::segment(
            &self.image,
            model,
            model.descriptor().input_size,
            self.config.mask_threshold,
            self.config.device,
        )?;
        Ok(Segmented {
            config: self.config,
            image: self.image,
            segmentation,
        })
    }
}

// ───────────────────────── Stage 2: Segmented ────────────────────────

/// Pipeline state after segmentation.
#[must_use = "pipeline stages are consumed by advancing, call .select_roi() to continue"]
pub struct Segmented {
    config: PipelineConfig,
    image: RgbImage,
    segmentation: Segmentation,
}

impl Segmented {
    /// Full segmentation output, including the raw thresholded mask.
    #[must_use]
    pub const fn segmentation(&self) -> &Segmentation {
        &self.segmentation
    }

    /// The final single-region mask.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.segmentation.mask
    }

    /// Crop the padded ROI around the mask.
    pub fn select_roi(self) -> RoiSelected {
        let selection = roi::derive_roi(&self.image, &self.segmentation.mask, self.config.pad_ratio);
        RoiSelected {
            config: self.config,
            image: self.image,
            segmentation: self.segmentation,
            selection,
        }
    }
}

// ───────────────────────── Stage 3: RoiSelected ──────────────────────

/// Pipeline state after ROI selection.
#[must_use = "pipeline stages are consumed by advancing, call .classify() to continue"]
pub struct RoiSelected {
    config: PipelineConfig,
    image: RgbImage,
    segmentation: Segmentation,
    selection: RoiSelection,
}

impl RoiSelected {
    /// The ROI crop and the boxes it came from.
    #[must_use]
    pub const fn selection(&self) -> &RoiSelection {
        &self.selection
    }

    /// Classify the ROI with `model`, using the model's own input size
    /// and label set.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Model`] if the model call fails or its
    /// logit count does not match its labels.
    pub fn classify(self, model: &dyn StageClassifier) -> Result<Classified, PipelineError> {
        let descriptor = model.descriptor();
        let classification = classify::classify(
            &self.selection.roi,
            model,
            descriptor.input_size,
            &descriptor.labels,
            self.config.device,
        )?;
        Ok(Classified {
            config: self.config,
            image: self.image,
            segmentation: self.segmentation,
            selection: self.selection,
            classification,
        })
    }
}

// ───────────────────────── Stage 4: Classified ───────────────────────

/// Pipeline state after classification.
#[must_use = "pipeline stages are consumed by advancing, call .review() to continue"]
pub struct Classified {
    config: PipelineConfig,
    image: RgbImage,
    segmentation: Segmentation,
    selection: RoiSelection,
    classification: ClassificationResult,
}

impl Classified {
    /// The ranked stage probabilities.
    #[must_use]
    pub const fn classification(&self) -> &ClassificationResult {
        &self.classification
    }

    /// Apply the review policy.
    pub fn review(self) -> Reviewed {
        let review = review::decide(
            self.selection.mask_was_empty,
            self.segmentation.area_ratio,
            self.config.min_area_ratio,
            self.classification.top1().prob,
            self.config.confidence_threshold,
        );
        debug!(
            stage = %self.classification.top1().stage,
            confidence = self.classification.top1().prob,
            review_needed = review.review_needed(),
            "case reviewed"
        );
        Reviewed {
            config: self.config,
            image: self.image,
            segmentation: self.segmentation,
            selection: self.selection,
            classification: self.classification,
            review,
        }
    }
}

// ───────────────────────── Stage 5: Reviewed ─────────────────────────

/// Final pipeline state.
#[must_use = "call .into_outcome() to extract the CaseOutcome"]
pub struct Reviewed {
    config: PipelineConfig,
    image: RgbImage,
    segmentation: Segmentation,
    selection: RoiSelection,
    classification: ClassificationResult,
    review: ReviewDecision,
}

impl Reviewed {
    /// The review verdict.
    #[must_use]
    pub const fn review(&self) -> &ReviewDecision {
        &self.review
    }

    /// Render the mask and overlay images and return the complete
    /// [`CaseOutcome`].
    #[must_use]
    pub fn into_outcome(self) -> CaseOutcome {
        let mask_image = overlay::mask_image(&self.segmentation.mask);
        let overlay = overlay::overlay_mask(&self.image, &self.segmentation.mask, self.config.overlay_alpha);
        CaseOutcome {
            dimensions: Dimensions::of(&self.image),
            mask: self.segmentation.mask,
            mask_image,
            overlay,
            roi: self.selection.roi,
            tight_bbox: self.selection.tight_bbox,
            roi_bbox: self.selection.bbox,
            mask_was_empty: self.selection.mask_was_empty,
            area_ratio: self.segmentation.area_ratio,
            classification: self.classification,
            review: self.review,
        }
    }
}

/// Everything the pipeline learned about one photograph.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    /// Dimensions of the decoded photograph.
    pub dimensions: Dimensions,
    /// Single-region wound mask at full resolution.
    pub mask: Mask,
    /// Mask rendered as 0/255 grayscale.
    pub mask_image: GrayImage,
    /// Photograph with the wound tinted red.
    pub overlay: RgbImage,
    /// Crop that was classified.
    pub roi: RgbImage,
    /// Tight box around the wound, `None` when nothing was detected.
    pub tight_bbox: Option<BoundingBox>,
    /// Padded, clamped box the ROI was cropped from.
    pub roi_bbox: BoundingBox,
    /// Whether segmentation found nothing and the full image was used.
    pub mask_was_empty: bool,
    /// Wound area as a fraction of the image.
    pub area_ratio: f64,
    /// Ranked stage probabilities.
    pub classification: ClassificationResult,
    /// Review verdict.
    pub review: ReviewDecision,
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental wound staging pipeline for a single photograph.
pub struct Pipeline;

impl Pipeline {
    /// Store source bytes and config without doing any work.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: PipelineConfig) -> Pending {
        Pending {
            config,
            source: image_bytes,
        }
    }

    /// Start from an already decoded photograph.
    pub const fn from_image(image: RgbImage, config: PipelineConfig) -> Decoded {
        Decoded { config, image }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::fakes::{FixedClassifier, FixedSegmenter};
    use crate::review::ReviewReason;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn pending_exposes_source_bytes() {
        let pending = Pipeline::new(vec![1, 2, 3], PipelineConfig::default());
        assert_eq!(pending.source(), &[1, 2, 3]);
    }

    #[test]
    fn decode_empty_input_returns_error() {
        let result = Pipeline::new(vec![], PipelineConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn decode_corrupt_input_returns_error() {
        let result = Pipeline::new(vec![0xFF, 0x00], PipelineConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn chained_stages_produce_outcome() {
        let photo = RgbImage::from_pixel(512, 512, image::Rgb([120, 90, 80]));
        let segmenter = FixedSegmenter::square(512, 100, 100, 149, 149);
        let classifier = FixedClassifier::with_probabilities(64, &[0.1, 0.7, 0.15, 0.05]);

        let decoded = Pipeline::new(png_bytes(&photo), PipelineConfig::default())
            .decode()
            .unwrap();
        assert_eq!(decoded.image().dimensions(), (512, 512));

        let segmented = decoded.segment(&segmenter).unwrap();
        assert_eq!(segmented.mask().foreground_count(), 2500);

        let selected = segmented.select_roi();
        assert_eq!(selected.selection().bbox, BoundingBox::new(88, 88, 161, 161));

        let classified = selected.classify(&classifier).unwrap();
        assert_eq!(classified.classification().top1().stage, "Stage_2");

        let reviewed = classified.review();
        assert!(!reviewed.review().review_needed());

        let outcome = reviewed.into_outcome();
        assert_eq!(outcome.roi.dimensions(), (74, 74));
        assert_eq!(outcome.mask_image.get_pixel(120, 120).0, [255]);
        assert_eq!(outcome.mask_image.get_pixel(0, 0).0, [0]);
        assert_eq!(outcome.overlay.get_pixel(0, 0), photo.get_pixel(0, 0));
        assert_ne!(outcome.overlay.get_pixel(120, 120), photo.get_pixel(120, 120));
    }

    #[test]
    fn empty_segmentation_flows_to_review() {
        let photo = RgbImage::from_pixel(40, 30, image::Rgb([5, 5, 5]));
        let segmenter = FixedSegmenter::empty(16);
        let classifier = FixedClassifier::with_probabilities(16, &[0.3, 0.3, 0.2, 0.2]);

        let outcome = Pipeline::from_image(photo.clone(), PipelineConfig::default())
            .segment(&segmenter)
            .unwrap()
            .select_roi()
            .classify(&classifier)
            .unwrap()
            .review()
            .into_outcome();

        assert!(outcome.mask_was_empty);
        assert_eq!(outcome.roi_bbox, BoundingBox::new(0, 0, 39, 29));
        assert_eq!(outcome.roi.as_raw(), photo.as_raw());
        assert_eq!(
            outcome.review.reasons(),
            [
                ReviewReason::NoMaskDetected,
                ReviewReason::MaskTooSmall,
                ReviewReason::LowConfidence,
            ]
        );
    }
}
