//! Split-conformal calibration: fit a score threshold `qhat` from held-out
//! non-conformity scores, then build per-request prediction sets.
//!
//! Non-conformity score for a labeled example is `1 - p[true_label]`: the
//! probability the model assigned to the class that did *not* happen. A
//! label `c` is included in the prediction set for a new example iff
//! `p[c] >= 1 - qhat`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DsError, Result};
use crate::core::paths::write_atomic;

/// Calibration state persisted alongside a model bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConformalCalib {
    pub alpha: f64,
    pub qhat: f64,
    pub labels: Vec<String>,
}

/// Compute the conformal quantile threshold from held-out non-conformity
/// scores. `q = min(ceil((n+1)(1-alpha))/n, 1.0)`, then the "higher"
/// interpolation quantile of `scores` at `q`.
///
/// # Panics
/// Panics if `scores` is empty — calibration requires at least one held-out
/// example.
#[must_use]
pub fn conformal_quantile(scores: &[f64], alpha: f64) -> f64 {
    assert!(!scores.is_empty(), "conformal calibration set must not be empty");
    let n = scores.len();
    let q = (((n + 1) as f64 * (1.0 - alpha)).ceil() / n as f64).min(1.0);

    let mut sorted: Vec<f64> = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_higher(&sorted, q)
}

/// `numpy`'s `method="higher"` quantile interpolation on an already-sorted
/// slice: the smallest sample at or above the exact quantile position.
fn quantile_higher(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (n - 1) as f64;
    let idx = pos.ceil() as usize;
    sorted[idx.min(n - 1)]
}

/// Fit a split-conformal calibration from per-example class probability
/// rows and their true binary labels (`0` or `1`).
#[must_use]
pub fn fit_split_conformal(proba: &[[f64; 2]], labels_true: &[u8], alpha: f64) -> ConformalCalib {
    assert_eq!(proba.len(), labels_true.len());
    let scores: Vec<f64> = proba
        .iter()
        .zip(labels_true)
        .map(|(p, &y)| 1.0 - p[usize::from(y)])
        .collect();
    let qhat = conformal_quantile(&scores, alpha);
    ConformalCalib {
        alpha,
        qhat,
        labels: vec!["0".to_string(), "1".to_string()],
    }
}

/// Build the prediction set for a single example: every label `c` such that
/// `p[c] >= 1 - qhat`.
#[must_use]
pub fn prediction_set(proba: &[f64; 2], calib: &ConformalCalib) -> Vec<String> {
    let threshold = 1.0 - calib.qhat;
    calib
        .labels
        .iter()
        .enumerate()
        .filter(|(i, _)| proba[*i] >= threshold)
        .map(|(_, label)| label.clone())
        .collect()
}

impl ConformalCalib {
    /// Save calibration metadata as JSON at `path` (atomic write).
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }

    /// Load calibration metadata from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| DsError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }
}
