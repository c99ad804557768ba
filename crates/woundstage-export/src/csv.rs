//! CSV batch report serializer.
//!
//! One header row, then one row per [`CaseResult`] in batch order.
//! Nested values are flattened so the file opens cleanly in a
//! spreadsheet:
//!
//! - `roi_bbox` becomes the four columns `roi_x1 roi_y1 roi_x2 roi_y2`;
//! - `review_reasons` is `;`-joined (`mask_too_small;low_confidence`);
//! - `top2` is `;`-joined `stage:prob` pairs (`Stage_2:0.7000;Stage_3:0.1500`).
//!
//! Fields containing a comma, quote, or line break are quoted with
//! embedded quotes doubled. Rows end in `\n`.
//!
//! This is a pure function with no I/O: it returns a `String`.

use std::fmt::Write;

use woundstage_pipeline::CaseResult;

/// Column names, in output order.
pub const HEADER: [&str; 14] = [
    "file",
    "pred_stage",
    "confidence",
    "area_ratio",
    "roi_x1",
    "roi_y1",
    "roi_x2",
    "roi_y2",
    "review_needed",
    "review_reasons",
    "mask_path",
    "overlay_path",
    "roi_path",
    "top2",
];

/// Serialize batch results as CSV text.
///
/// An empty batch yields just the header row.
#[must_use]
pub fn to_csv(results: &[CaseResult]) -> String {
    let mut out = String::new();
    write_row(&mut out, HEADER.iter().map(|h| (*h).to_string()));
    for result in results {
        write_row(&mut out, row(result).into_iter());
    }
    out
}

fn row(result: &CaseResult) -> Vec<String> {
    let reasons: Vec<&str> = result.review.reasons().iter().map(|r| r.as_str()).collect();
    let top2: Vec<String> = result
        .top2
        .iter()
        .map(|s| format!("{}:{:.4}", s.stage, s.prob))
        .collect();
    vec![
        result.file.clone(),
        result.pred_stage.clone(),
        format!("{:.6}", result.confidence),
        format!("{:.6}", result.area_ratio),
        result.roi_bbox.x1.to_string(),
        result.roi_bbox.y1.to_string(),
        result.roi_bbox.x2.to_string(),
        result.roi_bbox.y2.to_string(),
        result.review.review_needed().to_string(),
        reasons.join(";"),
        result.mask_path.clone(),
        result.overlay_path.clone(),
        result.roi_path.clone(),
        top2.join(";"),
    ]
}

fn write_row(out: &mut String, fields: impl Iterator<Item = String>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(&field));
    }
    let _ = writeln!(out);
}

/// Quote a field if it contains a delimiter, quote, or line break.
#[must_use]
pub fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
