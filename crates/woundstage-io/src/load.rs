//! Image file loading.

use std::path::{Path, PathBuf};

use woundstage_pipeline::decode::decode_rgb;
use woundstage_pipeline::types::RgbImage;
use woundstage_pipeline::{DecodeMode, PipelineError};

/// A photograph that could not be read. Fatal for that item only.
#[derive(Debug, thiserror::Error)]
pub enum ImageReadError {
    /// The file could not be opened or read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file was read but is not a decodable image.
    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: PipelineError,
    },
}

/// Read and decode the photograph at `path`.
///
/// # Errors
///
/// Returns [`ImageReadError::Io`] if the file is missing or unreadable
/// and [`ImageReadError::Decode`] if its contents are not a supported
/// image.
pub fn load_image(path: &Path, mode: DecodeMode) -> Result<RgbImage, ImageReadError> {
    let bytes = std::fs::read(path).map_err(|source| ImageReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_rgb(&bytes, mode).map_err(|source| ImageReadError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
