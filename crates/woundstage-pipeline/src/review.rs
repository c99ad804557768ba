//! Review policy: which cases need a human to look at them.

use serde::{Deserialize, Serialize};

/// Why a case was flagged for manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    /// Segmentation found no wound; the ROI is the full image.
    NoMaskDetected,
    /// The wound mask covers less than the configured minimum area.
    MaskTooSmall,
    /// The top-1 stage probability is below the confidence threshold.
    LowConfidence,
}

impl ReviewReason {
    /// Stable machine-readable name, as used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoMaskDetected => "no_mask_detected",
            Self::MaskTooSmall => "mask_too_small",
            Self::LowConfidence => "low_confidence",
        }
    }
}

impl std::fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review verdict for one case.
///
/// `review_needed` is true exactly when `reasons` is non-empty. Reasons
/// appear in the fixed order `no_mask_detected`, `mask_too_small`,
/// `low_confidence`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ReviewDecisionProxy")]
pub struct ReviewDecision {
    review_needed: bool,
    #[serde(rename = "review_reasons")]
    reasons: Vec<ReviewReason>,
}

#[derive(Deserialize)]
struct ReviewDecisionProxy {
    review_needed: bool,
    review_reasons: Vec<ReviewReason>,
}

impl TryFrom<ReviewDecisionProxy> for ReviewDecision {
    type Error = String;

    fn try_from(proxy: ReviewDecisionProxy) -> Result<Self, Self::Error> {
        if proxy.review_needed == proxy.review_reasons.is_empty() {
            return Err(format!(
                "review_needed is {} but {} reason(s) given",
                proxy.review_needed,
                proxy.review_reasons.len()
            ));
        }
        Ok(Self {
            review_needed: proxy.review_needed,
            reasons: proxy.review_reasons,
        })
    }
}

impl ReviewDecision {
    fn from_reasons(reasons: Vec<ReviewReason>) -> Self {
        Self {
            review_needed: !reasons.is_empty(),
            reasons,
        }
    }

    /// Whether any reason fired.
    #[must_use]
    pub const fn review_needed(&self) -> bool {
        self.review_needed
    }

    /// The reasons that fired, in fixed order.
    #[must_use]
    pub fn reasons(&self) -> &[ReviewReason] {
        &self.reasons
    }
}

/// Apply the review rules to one case.
///
/// Each rule is independent and all of them are evaluated:
///
/// - `no_mask_detected` when the mask was empty;
/// - `mask_too_small` when `area_ratio < min_area_ratio` (an empty mask
///   has ratio 0 and therefore trips this too unless the minimum is 0);
/// - `low_confidence` when `top1_prob < confidence_threshold`.
///
/// A NaN area ratio or probability trips its rule.
#[must_use]
pub fn decide(
    mask_was_empty: bool,
    area_ratio: f64,
    min_area_ratio: f64,
    top1_prob: f32,
    confidence_threshold: f32,
) -> ReviewDecision {
    let mut reasons = Vec::new();
    if mask_was_empty {
        reasons.push(ReviewReason::NoMaskDetected);
    }
    if area_ratio.is_nan() || area_ratio < min_area_ratio {
        reasons.push(ReviewReason::MaskTooSmall);
    }
    if top1_prob.is_nan() || top1_prob < confidence_threshold {
        reasons.push(ReviewReason::LowConfidence);
    }
    ReviewDecision::from_reasons(reasons)
}
