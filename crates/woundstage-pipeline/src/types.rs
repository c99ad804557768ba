//! Shared types for the woundstage pipeline.

use serde::{Deserialize, Serialize};

use crate::model::{Device, ModelError};

/// Re-export `RgbImage` so downstream crates can reference decoded
/// photographs and ROI crops without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `GrayImage` so downstream crates can reference rendered
/// mask images without depending on `image` directly.
pub use image::GrayImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an RGB image.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Inclusive pixel-space rectangle.
///
/// Every box produced by the pipeline satisfies
/// `0 <= x1 <= x2 < width` and `0 <= y1 <= y2 < height` for the image
/// it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left column (inclusive).
    pub x1: u32,
    /// Top row (inclusive).
    pub y1: u32,
    /// Right column (inclusive).
    pub x2: u32,
    /// Bottom row (inclusive).
    pub y2: u32,
}

impl BoundingBox {
    /// Create a box from inclusive corner coordinates.
    #[must_use]
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box covering every pixel of an image with the given dimensions.
    ///
    /// Zero-sized dimensions are treated as 1x1 so the box stays valid.
    #[must_use]
    pub const fn full(dimensions: Dimensions) -> Self {
        Self {
            x1: 0,
            y1: 0,
            x2: dimensions.width.saturating_sub(1),
            y2: dimensions.height.saturating_sub(1),
        }
    }

    /// Width in pixels (always at least 1).
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    /// Height in pixels (always at least 1).
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.y2 - self.y1 + 1
    }

    /// Returns `true` if `other` lies entirely within `self`.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.x1 <= other.x1 && self.y1 <= other.y1 && self.x2 >= other.x2 && self.y2 >= other.y2
    }

    /// Returns `true` if the box lies within an image of the given size.
    #[must_use]
    pub const fn fits_within(&self, dimensions: Dimensions) -> bool {
        self.x1 <= self.x2
            && self.y1 <= self.y2
            && self.x2 < dimensions.width
            && self.y2 < dimensions.height
    }
}

/// How the image loader treats embedded orientation metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// Apply the EXIF orientation tag before returning pixels. Matches
    /// how phone cameras store portrait photos.
    #[default]
    ExifAware,
    /// Return pixels exactly as stored, ignoring orientation metadata.
    Raw,
}

/// Configuration for the wound staging pipeline.
///
/// Defaults match the values the models were validated with. Use
/// [`validate`](Self::validate) before running a batch; the pipeline
/// entry points call it themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Probability above which a pixel is wound foreground.
    pub mask_threshold: f32,

    /// Fraction of the tight box width/height added on each side of the
    /// wound before cropping the ROI.
    pub pad_ratio: f64,

    /// Top-1 probability below which a case is flagged `low_confidence`.
    pub confidence_threshold: f32,

    /// Mask area ratio below which a case is flagged `mask_too_small`.
    pub min_area_ratio: f64,

    /// Whether to honor EXIF orientation when decoding.
    pub decode_mode: DecodeMode,

    /// Opacity of the red overlay drawn over wound pixels.
    pub overlay_alpha: f32,

    /// Compute device passed to every model call.
    pub device: Device,
}

impl PipelineConfig {
    /// Default mask binarization threshold.
    pub const DEFAULT_MASK_THRESHOLD: f32 = 0.5;
    /// Default ROI padding ratio.
    pub const DEFAULT_PAD_RATIO: f64 = 0.25;
    /// Default review confidence threshold.
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.60;
    /// Default minimum mask area ratio.
    pub const DEFAULT_MIN_AREA_RATIO: f64 = 0.002;
    /// Default overlay opacity.
    pub const DEFAULT_OVERLAY_ALPHA: f32 = 0.4;

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field
    /// that is non-finite or out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let unit = |name: &str, value: f64| {
            if value.is_finite() && (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(PipelineError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )))
            }
        };
        unit("mask_threshold", f64::from(self.mask_threshold))?;
        unit("confidence_threshold", f64::from(self.confidence_threshold))?;
        unit("min_area_ratio", self.min_area_ratio)?;
        unit("overlay_alpha", f64::from(self.overlay_alpha))?;
        if !(self.pad_ratio.is_finite() && self.pad_ratio >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "pad_ratio must be finite and non-negative, got {}",
                self.pad_ratio
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mask_threshold: Self::DEFAULT_MASK_THRESHOLD,
            pad_ratio: Self::DEFAULT_PAD_RATIO,
            confidence_threshold: Self::DEFAULT_CONFIDENCE_THRESHOLD,
            min_area_ratio: Self::DEFAULT_MIN_AREA_RATIO,
            decode_mode: DecodeMode::default(),
            overlay_alpha: Self::DEFAULT_OVERLAY_ALPHA,
            device: Device::default(),
        }
    }
}

/// Errors that can occur while staging a single image.
///
/// An empty segmentation is not an error. It is handled by the
/// full-image fallback and the review policy.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A model call failed or returned an unusable tensor.
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Serde-compatible proxy for `PipelineError`.
///
/// Wrapped errors are stored as their `Display` strings; the typed
/// sources cannot be reconstructed.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidConfig(String),
    Model(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::Model(e) => PipelineErrorProxy::Model(e.to_string()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::Model(msg) => Self::Model(ModelError::Inference(msg)),
        })
    }
}
