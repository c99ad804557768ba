//! Model seams: the traits the pipeline calls and the descriptors that
//! describe a loaded model.
//!
//! The pipeline never parses checkpoints. A loader (see `woundstage-io`)
//! turns weights plus a [`ModelDescriptor`] into a value implementing
//! [`SegmentationModel`] or [`StageClassifier`], and the pipeline only
//! borrows it. Models are immutable after load and shared read-only
//! across a whole batch.

use ndarray::{Array2, Array4, ArrayView4};
use serde::{Deserialize, Serialize};

/// Compute device a model call should run on.
///
/// Passed explicitly into every model invocation rather than picked up
/// from ambient state. Backends that cannot honor
/// [`Device::Accelerator`] fall back to the CPU and say so in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// Sequential CPU execution.
    #[default]
    Cpu,
    /// Parallel-hardware accelerator, when the backend has one.
    Accelerator,
}

/// Typed description of a trained model, split from its weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Architecture identifier (e.g. `unet`, `convnext_tiny`).
    pub architecture: String,

    /// Square input resolution the model was trained at.
    pub input_size: u32,

    /// Encoder or backbone name, when the architecture has one.
    #[serde(default)]
    pub backbone: Option<String>,

    /// Ordered class labels. Empty for segmentation models; for
    /// classifiers, index `i` names logit `i`.
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ModelDescriptor {
    /// Input size used by the wound segmenter when none is recorded.
    pub const DEFAULT_SEGMENTATION_INPUT_SIZE: u32 = 320;
    /// Input size used by the stage classifier when none is recorded.
    pub const DEFAULT_CLASSIFICATION_INPUT_SIZE: u32 = 384;
}

/// Errors raised by a model call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The backend failed to run the model.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The model returned a tensor of an unexpected shape.
    #[error("unexpected output shape: expected {expected}, got {actual:?}")]
    OutputShape {
        /// Human-readable description of the expected shape.
        expected: String,
        /// Shape actually returned.
        actual: Vec<usize>,
    },
}

/// Binary wound segmentation model.
///
/// Input is a `[1, 3, S, S]` NCHW batch with values in `[0, 1]`, where
/// `S` is [`ModelDescriptor::input_size`]. Output is the raw logit map
/// `[1, 1, S, S]`; the pipeline applies the sigmoid itself.
pub trait SegmentationModel {
    /// Descriptor the model was loaded with.
    fn descriptor(&self) -> &ModelDescriptor;

    /// Run the model on one batch.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the backend fails.
    fn logits(&self, batch: ArrayView4<'_, f32>, device: Device) -> Result<Array4<f32>, ModelError>;
}

/// Multi-class stage classifier.
///
/// Input is a `[1, 3, S, S]` NCHW batch already mean/std normalized.
/// Output is `[1, C]` logits where `C` is the descriptor's label count.
pub trait StageClassifier {
    /// Descriptor the model was loaded with.
    fn descriptor(&self) -> &ModelDescriptor;

    /// Run the model on one batch.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the backend fails.
    fn logits(&self, batch: ArrayView4<'_, f32>, device: Device) -> Result<Array2<f32>, ModelError>;
}
