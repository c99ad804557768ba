//! JSON batch report serializer.
//!
//! A pretty-printed array with one object per [`CaseResult`], in batch
//! order, using the record's own field names (`file`, `pred_stage`,
//! `confidence`, `area_ratio`, `roi_bbox`, `review_needed`,
//! `review_reasons`, `mask_path`, `overlay_path`, `roi_path`, `top2`).

use woundstage_pipeline::CaseResult;

/// Serialize batch results as a JSON array.
///
/// # Errors
///
/// Returns the `serde_json` error if serialization fails.
pub fn to_json(results: &[CaseResult]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(results)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_is_empty_array() {
        assert_eq!(to_json(&[]).unwrap(), "[]");
    }
}
