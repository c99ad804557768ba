//! Wound segmentation: photograph in, single-region mask out.
//!
//! Steps, in order:
//!
//! 1. Area-resize the image to the model's square input.
//! 2. Scale to `[0, 1]`, run the model, apply the sigmoid.
//! 3. Bilinearly resize the probability map back to full resolution.
//! 4. Threshold (strictly greater than).
//! 5. Keep the largest 8-connected component.
//!
//! An all-background result is an expected outcome, not an error. The
//! review policy flags it downstream.

use image::{Luma, RgbImage};
use ndarray::{Array4, Axis};
use tracing::debug;

use crate::mask::{self, Mask};
use crate::model::{Device, ModelError, SegmentationModel};
use crate::resize::{self, FloatImage};
use crate::types::PipelineError;

/// Output of the segmentation stage.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Wound probabilities at the model's input resolution.
    pub probabilities: FloatImage,
    /// Thresholded mask before component reduction.
    pub raw_mask: Mask,
    /// Final mask with at most one foreground region.
    pub mask: Mask,
    /// Foreground fraction of [`mask`](Self::mask), in `[0, 1]`.
    pub area_ratio: f64,
}

/// Logistic sigmoid.
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Convert an RGB image into a `[1, 3, H, W]` tensor scaled to `[0, 1]`.
#[must_use]
pub fn to_unit_tensor(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        #[allow(clippy::cast_possible_truncation)]
        let px = image.get_pixel(x as u32, y as u32);
        f32::from(px.0[c]) / 255.0
    })
}

/// Run the model and convert its logits into a probability raster at
/// the model's input size.
fn probability_map(
    image: &RgbImage,
    model: &dyn SegmentationModel,
    input_size: u32,
    device: Device,
) -> Result<FloatImage, PipelineError> {
    let resized = resize::resize_area(image, input_size, input_size);
    let batch = to_unit_tensor(&resized);
    let logits = model.logits(batch.view(), device)?;

    let side = input_size as usize;
    if logits.shape() != [1, 1, side, side] {
        return Err(ModelError::OutputShape {
            expected: format!("[1, 1, {side}, {side}]"),
            actual: logits.shape().to_vec(),
        }
        .into());
    }
    let plane = logits.index_axis(Axis(0), 0);
    let plane = plane.index_axis(Axis(0), 0);
    #[allow(clippy::cast_possible_truncation)]
    let probs = FloatImage::from_fn(input_size, input_size, |x, y| {
        Luma([sigmoid(plane[[y as usize, x as usize]])])
    });
    Ok(probs)
}

/// Segment the wound in `image`.
///
/// `input_size` is the model's square input resolution and `threshold`
/// the probability a pixel must exceed to count as wound.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `input_size` is zero,
/// and [`PipelineError::Model`] if the model fails or returns a logit
/// map of the wrong shape.
pub fn segment(
    image: &RgbImage,
    model: &dyn SegmentationModel,
    input_size: u32,
    threshold: f32,
    device: Device,
) -> Result<Segmentation, PipelineError> {
    if input_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "segmentation input size must be positive".to_string(),
        ));
    }

    let probabilities = probability_map(image, model, input_size, device)?;
    let full = resize::resize_bilinear(&probabilities, image.width(), image.height());
    let raw_mask = mask::threshold(&full, threshold);
    let mask = mask::keep_largest_component(&raw_mask);
    let area_ratio = mask.area_ratio();

    debug!(
        raw_foreground = raw_mask.foreground_count(),
        foreground = mask.foreground_count(),
        area_ratio,
        "segmentation complete"
    );

    Ok(Segmentation {
        probabilities,
        raw_mask,
        mask,
        area_ratio,
    })
}
