//! Decision policy: maps a prediction set and drift score to a serving
//! action, independent of schema validation (which overrides this entirely
//! when it fails).

use serde::{Deserialize, Serialize};

/// Serving action attached to a predict response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionCode {
    Predict,
    Monitor,
    Fallback,
    Abstain,
    Manual,
}

impl ActionCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Predict => "PREDICT",
            Self::Monitor => "MONITOR",
            Self::Fallback => "FALLBACK",
            Self::Abstain => "ABSTAIN",
            Self::Manual => "MANUAL",
        }
    }
}

pub const REASON_CONFORMAL_UNCERTAIN: &str = "CONFORMAL_UNCERTAIN";
pub const REASON_HARD_DRIFT: &str = "HARD_DRIFT";
pub const REASON_SOFT_DRIFT: &str = "SOFT_DRIFT";
pub const REASON_DATA_CONTRACT: &str = "DATA_CONTRACT";
pub const REASON_PREDICTION_ERROR: &str = "PREDICTION_ERROR";

/// Decide the serving action for one already-schema-valid request.
///
/// | condition | action |
/// |---|---|
/// | `prediction_set_len != 1` | ABSTAIN |
/// | `drift_score >= hard_thr` | FALLBACK |
/// | `drift_score >= soft_thr` | MONITOR |
/// | otherwise | PREDICT |
#[must_use]
pub fn decide_action(
    prediction_set_len: usize,
    drift_score: f64,
    soft_threshold: f64,
    hard_threshold: f64,
) -> (ActionCode, Vec<String>) {
    if prediction_set_len != 1 {
        return (ActionCode::Abstain, vec![REASON_CONFORMAL_UNCERTAIN.to_string()]);
    }
    if drift_score >= hard_threshold {
        return (ActionCode::Fallback, vec![REASON_HARD_DRIFT.to_string()]);
    }
    if drift_score >= soft_threshold {
        return (ActionCode::Monitor, vec![REASON_SOFT_DRIFT.to_string()]);
    }
    (ActionCode::Predict, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncertain_prediction_set_abstains_regardless_of_drift() {
        let (action, reasons) = decide_action(0, 0.0, 0.1, 0.25);
        assert_eq!(action, ActionCode::Abstain);
        assert_eq!(reasons, vec![REASON_CONFORMAL_UNCERTAIN]);

        let (action, _) = decide_action(2, 0.0, 0.1, 0.25);
        assert_eq!(action, ActionCode::Abstain);
    }

    #[test]
    fn hard_drift_overrides_soft_drift() {
        let (action, reasons) = decide_action(1, 0.30, 0.1, 0.25);
        assert_eq!(action, ActionCode::Fallback);
        assert_eq!(reasons, vec![REASON_HARD_DRIFT]);
    }

    #[test]
    fn soft_drift_between_thresholds_monitors() {
        let (action, reasons) = decide_action(1, 0.15, 0.1, 0.25);
        assert_eq!(action, ActionCode::Monitor);
        assert_eq!(reasons, vec![REASON_SOFT_DRIFT]);
    }

    #[test]
    fn below_soft_threshold_predicts_with_no_reasons() {
        let (action, reasons) = decide_action(1, 0.02, 0.1, 0.25);
        assert_eq!(action, ActionCode::Predict);
        assert!(reasons.is_empty());
    }

    #[test]
    fn boundary_values_are_inclusive() {
        let (action, _) = decide_action(1, 0.25, 0.1, 0.25);
        assert_eq!(action, ActionCode::Fallback);
        let (action, _) = decide_action(1, 0.1, 0.1, 0.25);
        assert_eq!(action, ActionCode::Monitor);
    }
}
