//! Cost-based candidate evaluation: run a bundle's full predict pipeline
//! over a held-out sample and score it against false-positive, false-
//! negative, and abstain costs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::conformal::calib::{prediction_set, ConformalCalib};
use crate::core::errors::Result;
use crate::core::paths::write_atomic;
use crate::model::calibrator::IsotonicCalibrator;
use crate::model::classifier::ProbabilisticClassifier;

/// Cost weights used to score a candidate vs. the active bundle.
#[derive(Debug, Clone, Copy)]
pub struct CostWeights {
    pub fp_cost: f64,
    pub fn_cost: f64,
    pub abstain_cost: f64,
}

/// Aggregate evaluation result over one held-out sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    pub n: usize,
    pub abstain_rate: f64,
    pub selective_accuracy: f64,
    pub avg_cost_per_txn: f64,
}

/// Evaluate one classifier+calibrator+conformal pipeline on `rows`/`labels`.
#[must_use]
pub fn evaluate<C: ProbabilisticClassifier>(
    classifier: &C,
    calibrator: &IsotonicCalibrator,
    calib: &ConformalCalib,
    rows: &[Vec<f64>],
    labels: &[u8],
    weights: CostWeights,
) -> EvalReport {
    let n = rows.len();
    if n == 0 {
        return EvalReport {
            n: 0,
            abstain_rate: 0.0,
            selective_accuracy: 0.0,
            avg_cost_per_txn: 0.0,
        };
    }

    let mut abstained = 0usize;
    let mut correct = 0usize;
    let mut total_cost = 0.0;

    for (row, &label) in rows.iter().zip(labels) {
        let raw = classifier.raw_proba(row);
        let calibrated = calibrator.predict_proba(raw[1]);
        let set = prediction_set(&calibrated, calib);

        if set.len() != 1 {
            abstained += 1;
            total_cost += weights.abstain_cost;
            continue;
        }

        let predicted: u8 = if set[0] == "1" { 1 } else { 0 };
        if predicted == label {
            correct += 1;
        } else if predicted == 1 && label == 0 {
            total_cost += weights.fp_cost;
        } else {
            total_cost += weights.fn_cost;
        }
    }

    let kept = n - abstained;
    EvalReport {
        n,
        #[allow(clippy::cast_precision_loss)]
        abstain_rate: abstained as f64 / n as f64,
        #[allow(clippy::cast_precision_loss)]
        selective_accuracy: if kept == 0 { 0.0 } else { correct as f64 / kept as f64 },
        #[allow(clippy::cast_precision_loss)]
        avg_cost_per_txn: total_cost / n as f64,
    }
}

/// Promotion gate: did the candidate's cost regress beyond tolerance, or is
/// a prior promotion still within its cooldown window?
///
/// `baseline_cost` should come from `reports/summary.json` when one exists
/// (see `read_baseline_cost`) — a freshly recomputed active-model cost is
/// only a fallback for when no summary has ever been persisted, matching
/// the original watcher's `_promotion_gate`.
#[must_use]
pub fn passes_promotion_gate(
    candidate: &EvalReport,
    baseline_cost: f64,
    max_cost_increase: f64,
    seconds_since_last_promotion: Option<f64>,
    promote_cooldown_seconds: f64,
) -> bool {
    if let Some(elapsed) = seconds_since_last_promotion {
        if elapsed < promote_cooldown_seconds {
            return false;
        }
    }
    candidate.avg_cost_per_txn <= baseline_cost * (1.0 + max_cost_increase)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SummaryCosts {
    fp_cost: f64,
    fn_cost: f64,
    abstain_cost: f64,
    avg_cost_per_txn: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Summary {
    rows: usize,
    target_coverage: f64,
    abstain_rate: f64,
    selective_accuracy: f64,
    costs: SummaryCosts,
}

/// Persist `reports/summary.json`, the baseline `passes_promotion_gate`
/// reads back on the next retrain cycle.
pub fn write_summary(
    reports_dir: &Path,
    report: &EvalReport,
    weights: CostWeights,
    target_coverage: f64,
) -> Result<()> {
    let summary = Summary {
        rows: report.n,
        target_coverage,
        abstain_rate: report.abstain_rate,
        selective_accuracy: report.selective_accuracy,
        costs: SummaryCosts {
            fp_cost: weights.fp_cost,
            fn_cost: weights.fn_cost,
            abstain_cost: weights.abstain_cost,
            avg_cost_per_txn: report.avg_cost_per_txn,
        },
    };
    write_atomic(
        &reports_dir.join("summary.json"),
        &serde_json::to_vec_pretty(&summary)?,
    )
}

/// Read `costs.avg_cost_per_txn` out of a previously written
/// `reports/summary.json`, if one exists and parses.
#[must_use]
pub fn read_baseline_cost(reports_dir: &Path) -> Option<f64> {
    let raw = fs::read_to_string(reports_dir.join("summary.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    value.get("costs")?.get("avg_cost_per_txn")?.as_f64()
}

/// Persist `reports/risk_coverage.csv`: for confidence-sorted coverage
/// fractions 0.1..=1.0 (19 points, matching `eval.py`'s
/// `np.linspace(0.1, 1.0, 19)`), the top-k-by-confidence error rate.
pub fn write_risk_coverage<C: ProbabilisticClassifier>(
    reports_dir: &Path,
    classifier: &C,
    calibrator: &IsotonicCalibrator,
    rows: &[Vec<f64>],
    labels: &[u8],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut scored: Vec<(f64, u8, u8)> = rows
        .iter()
        .zip(labels)
        .map(|(row, &label)| {
            let raw = classifier.raw_proba(row);
            let calibrated = calibrator.predict_proba(raw[1]);
            let (pred, confidence) = if calibrated[1] >= calibrated[0] {
                (1u8, calibrated[1])
            } else {
                (0u8, calibrated[0])
            };
            (confidence, pred, label)
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let n = scored.len();
    let mut csv = String::from("coverage_frac,risk_error_rate\n");
    for step in 0..19 {
        #[allow(clippy::cast_precision_loss)]
        let frac = 0.1 + f64::from(step) * (0.9 / 18.0);
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        let k = ((n as f64 * frac) as usize).clamp(1, n);
        let wrong = scored[..k].iter().filter(|(_, pred, label)| pred != label).count();
        #[allow(clippy::cast_precision_loss)]
        let error_rate = wrong as f64 / k as f64;
        csv.push_str(&format!("{frac:.6},{error_rate:.6}\n"));
    }
    write_atomic(&reports_dir.join("risk_coverage.csv"), csv.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFraud;
    impl ProbabilisticClassifier for AlwaysFraud {
        fn fit(_rows: &[Vec<f64>], _labels: &[u8]) -> crate::core::errors::Result<Self> {
            Ok(Self)
        }
        fn raw_proba(&self, _row: &[f64]) -> [f64; 2] {
            [0.01, 0.99]
        }
        fn save(&self, _path: &std::path::Path) -> crate::core::errors::Result<()> {
            Ok(())
        }
        fn load(_path: &std::path::Path) -> crate::core::errors::Result<Self> {
            Ok(Self)
        }
    }

    fn identity_calibrator() -> IsotonicCalibrator {
        IsotonicCalibrator::fit(&[0.0, 1.0], &[0.0, 1.0])
    }

    fn confident_calib() -> ConformalCalib {
        ConformalCalib {
            alpha: 0.1,
            qhat: 0.0,
            labels: vec!["0".to_string(), "1".to_string()],
        }
    }

    #[test]
    fn perfect_classifier_has_zero_cost_on_all_fraud_labels() {
        let classifier = AlwaysFraud;
        let calibrator = identity_calibrator();
        let calib = confident_calib();
        let rows = vec![vec![1.0]; 10];
        let labels = vec![1u8; 10];
        let weights = CostWeights {
            fp_cost: 5.0,
            fn_cost: 25.0,
            abstain_cost: 1.0,
        };
        let report = evaluate(&classifier, &calibrator, &calib, &rows, &labels, weights);
        assert!((report.avg_cost_per_txn).abs() < 1e-9);
        assert!((report.selective_accuracy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mislabeled_rows_incur_false_negative_cost() {
        let classifier = AlwaysFraud;
        let calibrator = identity_calibrator();
        let calib = confident_calib();
        let rows = vec![vec![1.0]; 4];
        let labels = vec![0u8; 4];
        let weights = CostWeights {
            fp_cost: 5.0,
            fn_cost: 25.0,
            abstain_cost: 1.0,
        };
        let report = evaluate(&classifier, &calibrator, &calib, &rows, &labels, weights);
        assert!((report.avg_cost_per_txn - 5.0).abs() < 1e-9);
    }

    #[test]
    fn empty_sample_reports_zeroed_out() {
        let classifier = AlwaysFraud;
        let calibrator = identity_calibrator();
        let calib = confident_calib();
        let weights = CostWeights {
            fp_cost: 5.0,
            fn_cost: 25.0,
            abstain_cost: 1.0,
        };
        let report = evaluate(&classifier, &calibrator, &calib, &[], &[], weights);
        assert_eq!(report.n, 0);
    }

    #[test]
    fn promotion_gate_rejects_cost_regression() {
        let baseline = EvalReport {
            n: 100,
            abstain_rate: 0.0,
            selective_accuracy: 1.0,
            avg_cost_per_txn: 1.0,
        };
        let regressed = EvalReport {
            avg_cost_per_txn: 2.0,
            ..baseline
        };
        assert!(!passes_promotion_gate(
            &regressed,
            baseline.avg_cost_per_txn,
            0.05,
            None,
            1800.0
        ));
    }

    #[test]
    fn promotion_gate_rejects_within_cooldown() {
        let baseline = EvalReport {
            n: 100,
            abstain_rate: 0.0,
            selective_accuracy: 1.0,
            avg_cost_per_txn: 1.0,
        };
        assert!(!passes_promotion_gate(
            &baseline,
            baseline.avg_cost_per_txn,
            0.05,
            Some(10.0),
            1800.0
        ));
        assert!(passes_promotion_gate(
            &baseline,
            baseline.avg_cost_per_txn,
            0.05,
            Some(3600.0),
            1800.0
        ));
    }

    #[test]
    fn write_summary_then_read_baseline_cost_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let report = EvalReport {
            n: 50,
            abstain_rate: 0.1,
            selective_accuracy: 0.95,
            avg_cost_per_txn: 0.42,
        };
        let weights = CostWeights {
            fp_cost: 1.0,
            fn_cost: 10.0,
            abstain_cost: 0.2,
        };
        write_summary(dir.path(), &report, weights, 0.9).unwrap();
        let baseline_cost = read_baseline_cost(dir.path()).unwrap();
        assert!((baseline_cost - 0.42).abs() < 1e-9);
    }

    #[test]
    fn read_baseline_cost_is_none_without_a_summary() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_baseline_cost(dir.path()).is_none());
    }
}
