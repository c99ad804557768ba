//! Integration test: run a directory of photographs through the batch
//! runner with in-memory models and check results, artifacts, and
//! reports on disk.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use image::RgbImage;
use ndarray::{Array2, Array4, ArrayView4};
use woundstage_io::{ArtifactWriter, BatchError, BatchRunner, discover_inputs, write_reports};
use woundstage_pipeline::{
    Device, ModelDescriptor, ModelError, PipelineConfig, ReviewReason, SegmentationModel,
    StageClassifier,
};

/// Segmenter that marks the centre half of its input as wound.
struct CentreSegmenter(ModelDescriptor);

impl SegmentationModel for CentreSegmenter {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.0
    }

    fn logits(&self, batch: ArrayView4<'_, f32>, _device: Device) -> Result<Array4<f32>, ModelError> {
        let s = batch.shape()[2];
        Ok(Array4::from_shape_fn((1, 1, s, s), |(_, _, y, x)| {
            let inside = (s / 4..3 * s / 4).contains(&x) && (s / 4..3 * s / 4).contains(&y);
            if inside { 8.0 } else { -8.0 }
        }))
    }
}

/// Classifier with fixed logits.
struct ConstClassifier(ModelDescriptor, Vec<f32>);

impl StageClassifier for ConstClassifier {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.0
    }

    fn logits(&self, _batch: ArrayView4<'_, f32>, _device: Device) -> Result<Array2<f32>, ModelError> {
        Ok(Array2::from_shape_vec((1, self.1.len()), self.1.clone()).unwrap())
    }
}

/// Classifier that always fails.
struct BrokenClassifier(ModelDescriptor);

impl StageClassifier for BrokenClassifier {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.0
    }

    fn logits(&self, _batch: ArrayView4<'_, f32>, _device: Device) -> Result<Array2<f32>, ModelError> {
        Err(ModelError::Inference("out of memory".to_string()))
    }
}

fn segmenter() -> CentreSegmenter {
    CentreSegmenter(ModelDescriptor {
        architecture: "unet".to_string(),
        input_size: 32,
        backbone: Some("resnet34".to_string()),
        labels: Vec::new(),
    })
}

fn classifier_descriptor() -> ModelDescriptor {
    ModelDescriptor {
        architecture: "convnext_tiny".to_string(),
        input_size: 24,
        backbone: None,
        labels: (1..=4).map(|i| format!("Stage_{i}")).collect(),
    }
}

fn classifier() -> ConstClassifier {
    let probs: [f32; 4] = [0.1, 0.7, 0.15, 0.05];
    ConstClassifier(classifier_descriptor(), probs.iter().map(|p| p.ln()).collect())
}

fn write_photo(path: &Path) {
    RgbImage::from_fn(80, 60, |x, y| image::Rgb([(x * 3) as u8, (y * 4) as u8, 90]))
        .save(path)
        .unwrap();
}

#[test]
fn directory_batch_writes_results_and_artifacts() {
    let input = tempfile::tempdir().unwrap();
    write_photo(&input.path().join("b_wound.png"));
    write_photo(&input.path().join("a_wound.jpg"));
    std::fs::write(input.path().join("corrupt.png"), b"not a png").unwrap();
    std::fs::write(input.path().join("notes.txt"), b"ignored").unwrap();

    let out = tempfile::tempdir().unwrap();
    let run_dir = out.path().join("run_1");
    let mut writer = ArtifactWriter::create(&run_dir).unwrap();

    let inputs = discover_inputs(input.path());
    assert_eq!(inputs.len(), 3);

    let (seg, cls) = (segmenter(), classifier());
    let runner = BatchRunner::new(&seg, &cls, PipelineConfig::default());
    let outcome = runner.run(&inputs, &mut writer).unwrap();

    let files: Vec<&str> = outcome
        .results
        .iter()
        .map(|r| Path::new(&r.file).file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(files, ["a_wound.jpg", "b_wound.png"]);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].file.ends_with("corrupt.png"));

    let first = &outcome.results[0];
    assert_eq!(first.pred_stage, "Stage_2");
    assert_eq!(first.top2[1].stage, "Stage_3");
    assert!(first.area_ratio > 0.1 && first.area_ratio < 0.5);
    assert!(!first.review.review_needed());
    assert!(first.roi_bbox.x2 < 80 && first.roi_bbox.y2 < 60);

    assert!(run_dir.join("masks/a_wound.png").is_file());
    assert!(run_dir.join("overlays/a_wound_overlay.jpg").is_file());
    assert!(run_dir.join("roi/a_wound_roi.jpg").is_file());
    assert_eq!(Path::new(&first.mask_path), run_dir.join("masks/a_wound.png"));

    let mask = image::open(run_dir.join("masks/b_wound.png")).unwrap().to_luma8();
    assert_eq!(mask.dimensions(), (80, 60));
    assert!(mask.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));

    let reports = write_reports(&run_dir, &outcome.results).unwrap();
    let csv = std::fs::read_to_string(reports.csv).unwrap();
    assert_eq!(csv.lines().count(), 3);
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(reports.json).unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[test]
fn missing_file_is_skipped_and_batch_continues() {
    let input = tempfile::tempdir().unwrap();
    let present = input.path().join("present.png");
    write_photo(&present);
    let missing = input.path().join("missing.jpg");

    let out = tempfile::tempdir().unwrap();
    let mut writer = ArtifactWriter::create(out.path()).unwrap();
    let (seg, cls) = (segmenter(), classifier());
    let outcome = BatchRunner::new(&seg, &cls, PipelineConfig::default())
        .run(&[missing, present], &mut writer)
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].file.ends_with("present.png"));
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].file.ends_with("missing.jpg"));
}

#[test]
fn empty_directory_gives_empty_results() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut writer = ArtifactWriter::create(out.path()).unwrap();

    let inputs = discover_inputs(input.path());
    let (seg, cls) = (segmenter(), classifier());
    let outcome = BatchRunner::new(&seg, &cls, PipelineConfig::default())
        .run(&inputs, &mut writer)
        .unwrap();

    assert!(outcome.results.is_empty());
    assert!(outcome.failures.is_empty());
}

#[test]
fn low_confidence_is_flagged() {
    let input = tempfile::tempdir().unwrap();
    let photo = input.path().join("w.png");
    write_photo(&photo);
    let out = tempfile::tempdir().unwrap();
    let mut writer = ArtifactWriter::create(out.path()).unwrap();

    let probs: [f32; 4] = [0.3, 0.2, 0.25, 0.25];
    let cls = ConstClassifier(classifier_descriptor(), probs.iter().map(|p| p.ln()).collect());
    let seg = segmenter();
    let outcome = BatchRunner::new(&seg, &cls, PipelineConfig::default())
        .run(&[photo], &mut writer)
        .unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.pred_stage, "Stage_1");
    assert_eq!(result.review.reasons(), [ReviewReason::LowConfidence]);
}

#[test]
fn model_failure_aborts_batch() {
    let input = tempfile::tempdir().unwrap();
    let photo = input.path().join("w.png");
    write_photo(&photo);
    let out = tempfile::tempdir().unwrap();
    let mut writer = ArtifactWriter::create(out.path()).unwrap();

    let seg = segmenter();
    let cls = BrokenClassifier(classifier_descriptor());
    let err = BatchRunner::new(&seg, &cls, PipelineConfig::default())
        .run(&[photo], &mut writer)
        .unwrap_err();
    assert!(matches!(err, BatchError::Pipeline { .. }));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let out = tempfile::tempdir().unwrap();
    let mut writer = ArtifactWriter::create(out.path()).unwrap();
    let config = PipelineConfig {
        mask_threshold: 2.0,
        ..PipelineConfig::default()
    };
    let (seg, cls) = (segmenter(), classifier());
    let err = BatchRunner::new(&seg, &cls, config)
        .run(&[], &mut writer)
        .unwrap_err();
    assert!(matches!(err, BatchError::Config(_)));
}

/// Clock that advances one millisecond per reading.
struct TickClock(std::cell::Cell<u64>);

impl woundstage_pipeline::diagnostics::Clock for TickClock {
    type Instant = u64;

    fn now(&self) -> u64 {
        let t = self.0.get();
        self.0.set(t + 1);
        t
    }

    fn elapsed(&self, since: &u64) -> std::time::Duration {
        std::time::Duration::from_millis(self.0.get() - since)
    }
}

#[test]
fn diagnostics_are_collected_per_staged_case() {
    let input = tempfile::tempdir().unwrap();
    write_photo(&input.path().join("a.png"));
    write_photo(&input.path().join("b.png"));
    std::fs::write(input.path().join("c.png"), b"broken").unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut writer = ArtifactWriter::create(out.path()).unwrap();

    let inputs = discover_inputs(input.path());
    let (seg, cls) = (segmenter(), classifier());
    let (outcome, diagnostics) = BatchRunner::new(&seg, &cls, PipelineConfig::default())
        .run_with_diagnostics(&inputs, &mut writer, &TickClock(std::cell::Cell::new(0)))
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics[0].0.ends_with("a.png"));
    assert!(diagnostics[1].1.total_duration > std::time::Duration::ZERO);
    assert!(diagnostics[0].1.report().contains("Case Diagnostics"));
}
