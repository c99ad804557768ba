//! woundstage-io: filesystem and model-runtime collaborators for the
//! woundstage pipeline.
//!
//! Everything here touches the outside world: input discovery, image
//! file loading, checkpoint loading through `rten`, artifact and report
//! writing, and the sequential batch runner. The staging logic itself
//! lives in `woundstage-pipeline`.

pub mod artifacts;
pub mod checkpoint;
pub mod discover;
pub mod load;
pub mod runner;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub use artifacts::{ArtifactWriter, ReportPaths, WriteError, write_reports};
pub use checkpoint::{LoadError, RtenClassifier, RtenSegmenter};
pub use discover::discover_inputs;
pub use load::{ImageReadError, load_image};
pub use runner::{BatchError, BatchRunner};

/// Directory that runs are placed under when no output path is given.
pub const DEFAULT_RUNS_DIR: &str = "runs";

/// Timestamped run directory under `base`: `<base>/run_<unix-seconds>`.
#[must_use]
pub fn run_directory(base: &Path, now: SystemTime) -> PathBuf {
    let secs = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    base.join(format!("run_{secs}"))
}
