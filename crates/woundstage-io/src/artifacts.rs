//! Per-case visual artifacts and batch report files.
//!
//! Layout under the run directory:
//!
//! ```text
//! <out>/masks/<stem>.png
//! <out>/overlays/<stem>_overlay.jpg
//! <out>/roi/<stem>_roi.jpg
//! <out>/results.csv
//! <out>/results.json
//! ```
//!
//! Artifacts are named after the source file stem. Two inputs with the
//! same stem in different directories overwrite each other; the writer
//! logs a warning when that happens.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use tracing::warn;
use woundstage_pipeline::types::{GrayImage, RgbImage};
use woundstage_pipeline::{ArtifactPaths, CaseOutcome, CaseResult};

/// JPEG quality for overlays and ROI crops.
pub const JPEG_QUALITY: u8 = 95;

/// Errors while writing run output.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Creating a directory or file failed.
    #[error("cannot write {}: {source}", path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Encoding an image failed.
    #[error("cannot encode {}: {source}", path.display())]
    Encode {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },

    /// Serializing the JSON report failed.
    #[error("cannot serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WriteError + '_ {
    move |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes mask, overlay, and ROI images for each case.
#[derive(Debug)]
pub struct ArtifactWriter {
    root: PathBuf,
    masks: PathBuf,
    overlays: PathBuf,
    roi: PathBuf,
    stems: HashSet<String>,
}

impl ArtifactWriter {
    /// Create the run directory and its `masks/`, `overlays/`, and
    /// `roi/` subdirectories.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Io`] if a directory cannot be created.
    pub fn create(root: &Path) -> Result<Self, WriteError> {
        let masks = root.join("masks");
        let overlays = root.join("overlays");
        let roi = root.join("roi");
        for dir in [&masks, &overlays, &roi] {
            std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            masks,
            overlays,
            roi,
            stems: HashSet::new(),
        })
    }

    /// The run directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the artifacts for the photograph at `source`.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] if any image cannot be encoded or written.
    pub fn write(&mut self, source: &Path, outcome: &CaseOutcome) -> Result<ArtifactPaths, WriteError> {
        let stem = source
            .file_stem()
            .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned());
        if !self.stems.insert(stem.clone()) {
            warn!(
                file = %source.display(),
                stem = %stem,
                "artifact name collision, earlier artifacts with this name are overwritten"
            );
        }

        let mask = self.masks.join(format!("{stem}.png"));
        let overlay = self.overlays.join(format!("{stem}_overlay.jpg"));
        let roi = self.roi.join(format!("{stem}_roi.jpg"));

        write_png(&mask, &outcome.mask_image)?;
        write_jpeg(&overlay, &outcome.overlay)?;
        write_jpeg(&roi, &outcome.roi)?;

        Ok(ArtifactPaths {
            mask: mask.display().to_string(),
            overlay: overlay.display().to_string(),
            roi: roi.display().to_string(),
        })
    }
}

fn create_file(path: &Path) -> Result<BufWriter<File>, WriteError> {
    File::create(path).map(BufWriter::new).map_err(io_error(path))
}

fn write_png(path: &Path, image: &GrayImage) -> Result<(), WriteError> {
    let mut file = create_file(path)?;
    PngEncoder::new(&mut file)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::L8,
        )
        .map_err(|source| WriteError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    file.flush().map_err(io_error(path))
}

fn write_jpeg(path: &Path, image: &RgbImage) -> Result<(), WriteError> {
    let mut file = create_file(path)?;
    JpegEncoder::new_with_quality(&mut file, JPEG_QUALITY)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|source| WriteError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    file.flush().map_err(io_error(path))
}

/// Paths of the written batch reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// `results.csv`.
    pub csv: PathBuf,
    /// `results.json`.
    pub json: PathBuf,
}

/// Write `results.csv` and `results.json` into `dir`.
///
/// # Errors
///
/// Returns [`WriteError`] if serialization or writing fails.
pub fn write_reports(dir: &Path, results: &[CaseResult]) -> Result<ReportPaths, WriteError> {
    let csv = dir.join("results.csv");
    let json = dir.join("results.json");
    std::fs::write(&csv, woundstage_export::to_csv(results)).map_err(io_error(&csv))?;
    std::fs::write(&json, woundstage_export::to_json(results)?).map_err(io_error(&json))?;
    Ok(ReportPaths { csv, json })
}
