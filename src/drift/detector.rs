//! Streaming drift detector: a bounded sliding window of live feature rows,
//! scored against a reference distribution via PSI + two-sample KS, with
//! stride-gated recomputation so every request doesn't pay for a full
//! recompute of the window statistics.

use std::collections::VecDeque;

use crate::drift::ks::ks_2samp;
use crate::drift::psi::{bin_frequencies, psi};
use crate::drift::reference::DriftReference;

const PSI_NORMALIZATION_FACTOR: f64 = 0.25;
const PSI_WEIGHT: f64 = 0.7;
const KS_WEIGHT: f64 = 0.3;

/// Result of scoring one live row against the current window.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftResult {
    pub drift_score: f64,
    pub top_drifted_features: Vec<String>,
    pub psi_mean: f64,
    pub ks_flag_frac: f64,
    pub soft_count: usize,
    pub hard_count: usize,
    /// Whether this call actually recomputed statistics (`false` means the
    /// window is still below the minimum size, or the stride hasn't elapsed
    /// and the previous cached result was returned).
    pub updated: bool,
}

impl DriftResult {
    fn zero() -> Self {
        Self {
            drift_score: 0.0,
            top_drifted_features: Vec::new(),
            psi_mean: 0.0,
            ks_flag_frac: 0.0,
            soft_count: 0,
            hard_count: 0,
            updated: false,
        }
    }
}

/// Windowed PSI + KS drift detector over a fixed reference distribution.
pub struct DriftDetector {
    feature_names: Vec<String>,
    reference: DriftReference,
    window_size: usize,
    stride: usize,
    min_window: usize,
    p_value_threshold: f64,
    soft_threshold: f64,
    hard_threshold: f64,
    top_k: usize,

    buffer: VecDeque<Vec<f64>>,
    since_last: usize,
    last_result: DriftResult,
}

impl DriftDetector {
    /// Build a detector bound to `reference`, with the given window/stride
    /// and PSI soft/hard thresholds (feature-level, distinct from the
    /// combined `drift_score` soft/hard thresholds used by the decision
    /// policy).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: DriftReference,
        window_size: usize,
        stride: usize,
        min_window: usize,
        p_value_threshold: f64,
        feature_soft_threshold: f64,
        feature_hard_threshold: f64,
        top_k: usize,
    ) -> Self {
        let feature_names = reference.feature_names.clone();
        Self {
            feature_names,
            reference,
            window_size,
            stride,
            min_window,
            p_value_threshold,
            soft_threshold: feature_soft_threshold,
            hard_threshold: feature_hard_threshold,
            top_k,
            buffer: VecDeque::new(),
            since_last: 0,
            last_result: DriftResult::zero(),
        }
    }

    /// Feature names this detector expects, in row order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Append one live feature row and (maybe) recompute drift statistics.
    ///
    /// Returns an all-zero, `updated: false` result until the buffer holds
    /// at least `max(min_window, stride)` rows; after that, recomputes only
    /// every `stride` calls and returns the cached result otherwise.
    pub fn update_and_score(&mut self, row: &[f64]) -> DriftResult {
        self.buffer.push_back(row.to_vec());
        while self.buffer.len() > self.window_size {
            self.buffer.pop_front();
        }
        self.since_last += 1;

        let floor = self.min_window.max(self.stride);
        if self.buffer.len() < floor {
            return DriftResult::zero();
        }
        if self.since_last < self.stride {
            let mut cached = self.last_result.clone();
            cached.updated = false;
            return cached;
        }

        self.since_last = 0;
        let result = self.recompute();
        self.last_result = result.clone();
        result
    }

    fn recompute(&self) -> DriftResult {
        let n = self.feature_names.len();
        let mut psi_vals = vec![0.0_f64; n];
        let mut ks_pvals = vec![1.0_f64; n];

        for (j, name) in self.feature_names.iter().enumerate() {
            let live_col: Vec<f64> = self.buffer.iter().map(|r| r[j]).collect();
            if let Some(feat_ref) = self.reference.psi.get(name) {
                let actual = bin_frequencies(&live_col, &feat_ref.edges);
                psi_vals[j] = psi(&feat_ref.expected, &actual);
            }
            let ref_col: Vec<f64> = self.reference.ks_ref.iter().map(|r| r[j]).collect();
            let (_, p) = ks_2samp(&ref_col, &live_col);
            ks_pvals[j] = p;
        }

        let psi_score = clamp01(mean(
            &psi_vals
                .iter()
                .map(|v| (v / PSI_NORMALIZATION_FACTOR).min(1.0))
                .collect::<Vec<_>>(),
        ));
        let ks_flag_frac = clamp01(mean(
            &ks_pvals
                .iter()
                .map(|&p| if p < self.p_value_threshold { 1.0 } else { 0.0 })
                .collect::<Vec<_>>(),
        ));
        let drift_score = clamp01(PSI_WEIGHT * psi_score + KS_WEIGHT * ks_flag_frac);

        let soft_count = psi_vals.iter().filter(|&&v| v > self.soft_threshold).count();
        let hard_count = psi_vals.iter().filter(|&&v| v > self.hard_threshold).count();

        let mut ranked: Vec<(usize, f64)> = psi_vals.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let top_drifted_features = ranked
            .into_iter()
            .take(self.top_k)
            .map(|(i, _)| self.feature_names[i].clone())
            .collect();

        DriftResult {
            drift_score,
            top_drifted_features,
            psi_mean: mean(&psi_vals),
            ks_flag_frac,
            soft_count,
            hard_count,
            updated: true,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}
