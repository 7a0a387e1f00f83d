//! Turns the classifier score into a verdict.
//!
//! Scores below [`SANITY_THRESHOLD`] are not treated as confident negatives:
//! they are reported back as [`DecisionOutcome::Ambiguous`] and the request is
//! rejected. Only `[0.5, 0.579)` maps to Non-cancer.

use crate::models::PredictionResult;

/// Cutoff separating Cancer from Non-cancer.
pub const CANCER_THRESHOLD: f32 = 0.579;

/// Anything below this is considered a malfunctioning prediction.
pub const SANITY_THRESHOLD: f32 = 0.5;

pub const CANCER_SUGGESTION: &str = "Segera periksa ke dokter!";
pub const NON_CANCER_SUGGESTION: &str = "Penyakit kanker tidak terdeteksi.";

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Ambiguous {
        score: f32,
    },
    Verdict {
        result: PredictionResult,
        suggestion: &'static str,
        score: f32,
    },
}

pub fn decide(score: f32) -> DecisionOutcome {
    // NaN fails every comparison below, so reject non-finite scores up front.
    if !score.is_finite() || score < SANITY_THRESHOLD {
        return DecisionOutcome::Ambiguous { score };
    }

    if score >= CANCER_THRESHOLD {
        DecisionOutcome::Verdict {
            result: PredictionResult::Cancer,
            suggestion: CANCER_SUGGESTION,
            score,
        }
    } else {
        DecisionOutcome::Verdict {
            result: PredictionResult::NonCancer,
            suggestion: NON_CANCER_SUGGESTION,
            score,
        }
    }
}
