//! woundstage-export: Pure batch report serializers (sans-IO)
//!
//! Converts a batch of [`CaseResult`](woundstage_pipeline::CaseResult)s
//! into report text. Supports CSV and JSON; writing the text to disk is
//! `woundstage-io`'s job.

pub mod csv;
pub mod json;

pub use csv::to_csv;
pub use json::to_json;
