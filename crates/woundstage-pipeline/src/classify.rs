//! Stage classification of the ROI.
//!
//! The ROI is area-resized to the classifier's square input, scaled to
//! `[0, 1]`, and normalized per channel with the ImageNet reference
//! statistics the classifier was trained with. These constants must
//! match training exactly.

use image::RgbImage;
use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};

use crate::model::{Device, ModelError, StageClassifier};
use crate::resize;
use crate::types::PipelineError;

/// Per-channel mean subtracted after scaling to `[0, 1]`.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation divided out after mean subtraction.
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// One label with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageScore {
    /// Stage label from the classifier's label set.
    pub stage: String,
    /// Softmax probability.
    pub prob: f32,
}

/// Ranked probability distribution over the full label set.
///
/// Never empty: the top prediction is held apart from the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    top1: StageScore,
    rest: Vec<StageScore>,
}

impl Serialize for ClassificationResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Ranked<'a> {
            ranked: Vec<&'a StageScore>,
        }
        Ranked {
            ranked: self.ranked().collect(),
        }
        .serialize(serializer)
    }
}

impl ClassificationResult {
    /// Rank `probabilities` (index-aligned with `labels`) in descending
    /// order. The sort is stable, so on an exact tie the label that
    /// appears first in `labels` ranks higher.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::OutputShape`] if the lengths differ or the
    /// label set is empty, and [`ModelError::Inference`] if any
    /// probability is not finite.
    pub fn from_probabilities(labels: &[String], probabilities: &[f32]) -> Result<Self, ModelError> {
        let shape_error = || ModelError::OutputShape {
            expected: format!("[1, {}]", labels.len()),
            actual: vec![1, probabilities.len()],
        };
        if labels.len() != probabilities.len() {
            return Err(shape_error());
        }
        if let Some(p) = probabilities.iter().find(|p| !p.is_finite()) {
            return Err(ModelError::Inference(format!(
                "classifier produced a non-finite probability ({p})"
            )));
        }
        let mut ranked: Vec<StageScore> = labels
            .iter()
            .zip(probabilities)
            .map(|(stage, &prob)| StageScore {
                stage: stage.clone(),
                prob,
            })
            .collect();
        ranked.sort_by(|a, b| b.prob.total_cmp(&a.prob));
        let mut ranked = ranked.into_iter();
        let top1 = ranked.next().ok_or_else(shape_error)?;
        Ok(Self {
            top1,
            rest: ranked.collect(),
        })
    }

    /// All labels, highest probability first.
    pub fn ranked(&self) -> impl Iterator<Item = &StageScore> {
        std::iter::once(&self.top1).chain(&self.rest)
    }

    /// The single top prediction.
    #[must_use]
    pub const fn top1(&self) -> &StageScore {
        &self.top1
    }

    /// The two highest-ranked candidates (one if the label set has one).
    #[must_use]
    pub fn top2(&self) -> Vec<StageScore> {
        self.ranked().take(2).cloned().collect()
    }
}

/// Numerically stable softmax.
#[must_use]
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Convert an RGB image into a normalized `[1, 3, H, W]` tensor.
#[must_use]
pub fn to_normalized_tensor(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        #[allow(clippy::cast_possible_truncation)]
        let px = image.get_pixel(x as u32, y as u32);
        (f32::from(px.0[c]) / 255.0 - CHANNEL_MEAN[c]) / CHANNEL_STD[c]
    })
}

/// Classify the ROI into one of the model's stage labels.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `input_size` is zero, and
/// [`PipelineError::Model`] if the model fails, returns a non-finite
/// logit, or its logit count does not match `labels`.
pub fn classify(
    roi: &RgbImage,
    model: &dyn StageClassifier,
    input_size: u32,
    labels: &[String],
    device: Device,
) -> Result<ClassificationResult, PipelineError> {
    if input_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "classification input size must be positive".to_string(),
        ));
    }

    let resized = resize::resize_area(roi, input_size, input_size);
    let batch = to_normalized_tensor(&resized);
    let logits = model.logits(batch.view(), device)?;
    if logits.iter().any(|l| !l.is_finite()) {
        return Err(
            ModelError::Inference("classifier produced a non-finite logit".to_string()).into(),
        );
    }
    if logits.nrows() != 1 {
        return Err(ModelError::OutputShape {
            expected: format!("[1, {}]", labels.len()),
            actual: logits.shape().to_vec(),
        }
        .into());
    }
    let row: Vec<f32> = logits.index_axis(Axis(0), 0).to_vec();
    let probabilities = softmax(&row);
    Ok(ClassificationResult::from_probabilities(labels, &probabilities)?)
}
