//! Isotonic probability calibration: fits a monotone, piecewise-constant
//! map from the classifier's raw `p1` to a calibrated probability, via the
//! pool-adjacent-violators algorithm (PAVA).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DsError, Result};
use crate::core::paths::write_atomic;

const CLIP_MIN: f64 = 1e-12;
const CLIP_MAX: f64 = 1.0 - 1e-12;

/// One pooled, non-decreasing block of the fitted step function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Block {
    x_min: f64,
    x_max: f64,
    value: f64,
}

/// Monotone isotonic calibrator, `out_of_bounds="clip"` semantics: inputs
/// below the first block's `x_min` clip to the first fitted value, inputs
/// above the last block's `x_max` clip to the last fitted value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsotonicCalibrator {
    blocks: Vec<Block>,
}

impl IsotonicCalibrator {
    /// Fit against `(raw_p1, label)` pairs from the calibration split.
    /// `labels` must be `0`/`1`.
    ///
    /// # Panics
    /// Panics if `xs` and `ys` differ in length or are empty.
    #[must_use]
    pub fn fit(xs: &[f64], ys: &[f64]) -> Self {
        assert_eq!(xs.len(), ys.len());
        assert!(!xs.is_empty(), "isotonic calibration set must not be empty");

        let mut pairs: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        // Stack-based PAVA: each stack entry is (x_min, x_max, weighted_sum, weight).
        let mut stack: Vec<(f64, f64, f64, f64)> = Vec::new();
        for (x, y) in pairs {
            let mut cur = (x, x, y, 1.0_f64);
            while let Some(&(p_min, _p_max, p_sum, p_w)) = stack.last() {
                let p_avg = p_sum / p_w;
                let cur_avg = cur.2 / cur.3;
                if p_avg > cur_avg {
                    let merged = (p_min, cur.1, p_sum + cur.2, p_w + cur.3);
                    stack.pop();
                    cur = merged;
                } else {
                    break;
                }
            }
            stack.push(cur);
        }

        let blocks = stack
            .into_iter()
            .map(|(x_min, x_max, sum, w)| Block {
                x_min,
                x_max,
                value: sum / w,
            })
            .collect();

        Self { blocks }
    }

    /// Calibrated `p1`, clipped to `[1e-12, 1-1e-12]`.
    #[must_use]
    pub fn predict_p1(&self, raw_p1: f64) -> f64 {
        let value = self.lookup(raw_p1);
        value.clamp(CLIP_MIN, CLIP_MAX)
    }

    /// Calibrated `[p0, p1]`.
    #[must_use]
    pub fn predict_proba(&self, raw_p1: f64) -> [f64; 2] {
        let p1 = self.predict_p1(raw_p1);
        [1.0 - p1, p1]
    }

    fn lookup(&self, x: f64) -> f64 {
        if x <= self.blocks[0].x_min {
            return self.blocks[0].value;
        }
        if x >= self.blocks[self.blocks.len() - 1].x_max {
            return self.blocks[self.blocks.len() - 1].value;
        }
        for block in &self.blocks {
            if x >= block.x_min && x <= block.x_max {
                return block.value;
            }
        }
        // Falls between two blocks (a flat gap from repeated input values);
        // use the nearest preceding block's value, matching sklearn's
        // right-continuous step interpolation.
        self.blocks
            .iter()
            .rev()
            .find(|b| b.x_max <= x)
            .map_or(self.blocks[0].value, |b| b.value)
    }

    /// Save as JSON at `path` (atomic write).
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| DsError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_produces_monotone_nondecreasing_blocks() {
        let xs = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let ys = vec![0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let calib = IsotonicCalibrator::fit(&xs, &ys);
        for w in calib.blocks.windows(2) {
            assert!(w[1].value >= w[0].value);
        }
    }

    #[test]
    fn predictions_are_clipped() {
        let xs = vec![0.0, 1.0];
        let ys = vec![0.0, 1.0];
        let calib = IsotonicCalibrator::fit(&xs, &ys);
        assert!(calib.predict_p1(-5.0) >= CLIP_MIN);
        assert!(calib.predict_p1(5.0) <= CLIP_MAX);
    }

    #[test]
    fn out_of_bounds_clips_to_edge_blocks() {
        let xs = vec![0.2, 0.5, 0.8];
        let ys = vec![0.1, 0.5, 0.9];
        let calib = IsotonicCalibrator::fit(&xs, &ys);
        assert_eq!(calib.predict_p1(-1.0), calib.lookup(0.2).clamp(CLIP_MIN, CLIP_MAX));
        assert_eq!(calib.predict_p1(2.0), calib.lookup(0.8).clamp(CLIP_MIN, CLIP_MAX));
    }

    #[test]
    fn predict_proba_sums_to_one() {
        let xs = vec![0.1, 0.5, 0.9];
        let ys = vec![0.0, 0.5, 1.0];
        let calib = IsotonicCalibrator::fit(&xs, &ys);
        let proba = calib.predict_proba(0.5);
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proba_calibrator.json");
        let xs = vec![0.1, 0.2, 0.3];
        let ys = vec![0.0, 1.0, 1.0];
        let calib = IsotonicCalibrator::fit(&xs, &ys);
        calib.save(&path).unwrap();
        let loaded = IsotonicCalibrator::load(&path).unwrap();
        assert_eq!(calib, loaded);
    }
}
