//! Checkpoint loading.
//!
//! A checkpoint is a small JSON descriptor next to an `.rten` weights
//! file:
//!
//! ```json
//! {
//!   "architecture": "convnext_tiny",
//!   "input_size": 384,
//!   "labels": ["Stage_1", "Stage_2", "Stage_3", "Stage_4"],
//!   "weights": "stage_classifier.rten"
//! }
//! ```
//!
//! `weights` is resolved relative to the descriptor's directory.
//! `input_size` defaults to 320 for segmenters and 384 for classifiers;
//! classifier `labels` default to `Stage_1` through `Stage_4`.
//!
//! The loaded models run on the CPU through `rten`. A request for
//! [`Device::Accelerator`] is honored by falling back to the CPU with a
//! warning, logged once per model.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Array4, ArrayView4, Ix2, Ix4};
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};
use serde::Deserialize;
use tracing::{info, warn};
use woundstage_pipeline::{Device, ModelDescriptor, ModelError, SegmentationModel, StageClassifier};

/// Labels assumed when a classifier descriptor lists none.
pub const DEFAULT_STAGE_LABELS: [&str; 4] = ["Stage_1", "Stage_2", "Stage_3", "Stage_4"];

/// Errors while loading a checkpoint. Fatal for the whole run.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The descriptor file could not be read.
    #[error("cannot read model descriptor {}: {source}", path.display())]
    Io {
        /// Descriptor path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The descriptor is not valid JSON of the expected shape.
    #[error("invalid model descriptor {}: {source}", path.display())]
    Descriptor {
        /// Descriptor path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The descriptor parsed but its contents are unusable.
    #[error("invalid model descriptor {}: {reason}", path.display())]
    Invalid {
        /// Descriptor path.
        path: PathBuf,
        /// What is wrong.
        reason: String,
    },

    /// The weights file could not be loaded by the runtime.
    #[error("cannot load model weights {}: {reason}", path.display())]
    Weights {
        /// Weights path.
        path: PathBuf,
        /// Runtime error message.
        reason: String,
    },
}

/// What the loaded model is for; selects descriptor defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Wound segmenter.
    Segmentation,
    /// Stage classifier.
    Classification,
}

/// On-disk descriptor layout.
#[derive(Debug, Deserialize)]
struct DescriptorFile {
    architecture: String,
    #[serde(default)]
    input_size: Option<u32>,
    #[serde(default)]
    backbone: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    weights: PathBuf,
}

/// Read a descriptor file, apply role defaults, and resolve the weights
/// path.
///
/// # Errors
///
/// Returns [`LoadError`] if the file is unreadable, malformed, declares
/// a zero input size, or (for classifiers) declares duplicate labels.
pub fn read_descriptor(path: &Path, role: ModelRole) -> Result<(ModelDescriptor, PathBuf), LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: DescriptorFile = serde_json::from_str(&text).map_err(|source| LoadError::Descriptor {
        path: path.to_path_buf(),
        source,
    })?;

    let invalid = |reason: &str| LoadError::Invalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let input_size = file.input_size.unwrap_or(match role {
        ModelRole::Segmentation => ModelDescriptor::DEFAULT_SEGMENTATION_INPUT_SIZE,
        ModelRole::Classification => ModelDescriptor::DEFAULT_CLASSIFICATION_INPUT_SIZE,
    });
    if input_size == 0 {
        return Err(invalid("input_size must be positive"));
    }

    let labels = match role {
        ModelRole::Segmentation => file.labels,
        ModelRole::Classification if file.labels.is_empty() => {
            DEFAULT_STAGE_LABELS.iter().map(ToString::to_string).collect()
        }
        ModelRole::Classification => file.labels,
    };
    let mut sorted = labels.clone();
    sorted.sort();
    sorted.dedup();
    if sorted.len() != labels.len() {
        return Err(invalid("labels must be unique"));
    }

    let weights = path
        .parent()
        .map_or_else(|| file.weights.clone(), |dir| dir.join(&file.weights));

    Ok((
        ModelDescriptor {
            architecture: file.architecture,
            input_size,
            backbone: file.backbone,
            labels,
        },
        weights,
    ))
}

/// A descriptor plus its runtime graph.
struct RtenModel {
    descriptor: ModelDescriptor,
    model: Model,
    fallback_logged: Cell<bool>,
}

impl RtenModel {
    fn load(path: &Path, role: ModelRole) -> Result<Self, LoadError> {
        let (descriptor, weights) = read_descriptor(path, role)?;
        let model = Model::load_file(&weights).map_err(|e| LoadError::Weights {
            path: weights.clone(),
            reason: e.to_string(),
        })?;
        info!(
            architecture = %descriptor.architecture,
            backbone = descriptor.backbone.as_deref().unwrap_or("-"),
            input_size = descriptor.input_size,
            labels = descriptor.labels.len(),
            weights = %weights.display(),
            "loaded model"
        );
        Ok(Self {
            descriptor,
            model,
            fallback_logged: Cell::new(false),
        })
    }

    /// Run the graph on one NCHW batch and return the output's shape and
    /// row-major values.
    fn run(&self, batch: ArrayView4<'_, f32>, device: Device) -> Result<(Vec<usize>, Vec<f32>), ModelError> {
        if device == Device::Accelerator && !self.fallback_logged.replace(true) {
            warn!(
                architecture = %self.descriptor.architecture,
                "accelerator requested but the rten backend is CPU-only, falling back to CPU"
            );
        }

        let (n, c, h, w) = batch.dim();
        let data: Vec<f32> = batch.iter().copied().collect();
        let input = NdTensor::from_data([n, c, h, w], data);
        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        let output: Tensor<f32> = output
            .try_into()
            .map_err(|e: rten::TryFromValueError| ModelError::Inference(e.to_string()))?;
        Ok((output.shape().to_vec(), output.to_vec()))
    }
}

/// Segmentation model backed by `rten`.
pub struct RtenSegmenter(RtenModel);

impl RtenSegmenter {
    /// Load from a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the descriptor or weights cannot be loaded.
    pub fn load(descriptor_path: &Path) -> Result<Self, LoadError> {
        RtenModel::load(descriptor_path, ModelRole::Segmentation).map(Self)
    }
}

impl SegmentationModel for RtenSegmenter {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.0.descriptor
    }

    fn logits(&self, batch: ArrayView4<'_, f32>, device: Device) -> Result<Array4<f32>, ModelError> {
        let (shape, values) = self.0.run(batch, device)?;
        let dims: [usize; 4] = shape.as_slice().try_into().map_err(|_| ModelError::OutputShape {
            expected: "[1, 1, S, S]".to_string(),
            actual: shape.clone(),
        })?;
        Array4::from_shape_vec(Ix4(dims[0], dims[1], dims[2], dims[3]), values)
            .map_err(|e| ModelError::Inference(e.to_string()))
    }
}

/// Stage classifier backed by `rten`.
pub struct RtenClassifier(RtenModel);

impl RtenClassifier {
    /// Load from a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the descriptor or weights cannot be loaded.
    pub fn load(descriptor_path: &Path) -> Result<Self, LoadError> {
        RtenModel::load(descriptor_path, ModelRole::Classification).map(Self)
    }
}

impl StageClassifier for RtenClassifier {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.0.descriptor
    }

    fn logits(&self, batch: ArrayView4<'_, f32>, device: Device) -> Result<Array2<f32>, ModelError> {
        let (shape, values) = self.0.run(batch, device)?;
        let dims: [usize; 2] = shape.as_slice().try_into().map_err(|_| ModelError::OutputShape {
            expected: format!("[1, {}]", self.0.descriptor.labels.len()),
            actual: shape.clone(),
        })?;
        Array2::from_shape_vec(Ix2(dims[0], dims[1]), values)
            .map_err(|e| ModelError::Inference(e.to_string()))
    }
}
