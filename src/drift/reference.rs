//! Build the drift reference (PSI bin edges + expected frequencies, plus a
//! KS reference sample) from a training dataset.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DsError, Result};
use crate::core::paths::write_atomic;
use crate::drift::psi::bin_frequencies;

/// Per-feature PSI reference: quantile bin edges and expected frequencies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PsiFeatureRef {
    pub edges: Vec<f64>,
    pub expected: Vec<f64>,
}

/// The full drift reference persisted alongside a model bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftReference {
    pub feature_names: Vec<String>,
    pub psi_bins: usize,
    pub psi: HashMap<String, PsiFeatureRef>,
    /// KS reference sample, one row per record, `feature_names`-ordered.
    pub ks_ref: Vec<Vec<f64>>,
}

/// Build quantile bin edges over `values` for `psi_bins` equal-probability
/// buckets. Non-increasing edges (caused by repeated values) are repaired by
/// nudging forward with a small epsilon, so every bin stays non-degenerate.
fn quantile_edges(values: &[f64], psi_bins: usize) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let mut edges: Vec<f64> = (0..=psi_bins)
        .map(|i| {
            let q = i as f64 / psi_bins as f64;
            let pos = q * (n - 1).max(0) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            if n == 0 {
                0.0
            } else if lo == hi {
                sorted[lo.min(n - 1)]
            } else {
                let frac = pos - lo as f64;
                sorted[lo] * (1.0 - frac) + sorted[hi.min(n - 1)] * frac
            }
        })
        .collect();

    for i in 1..edges.len() {
        if edges[i] <= edges[i - 1] {
            edges[i] = edges[i - 1] + 1e-6;
        }
    }
    edges
}

/// Build a drift reference from training rows (`rows[i][j]` = feature `j` of
/// record `i`), sampling up to `n_ref_sample` rows (seeded) for the KS
/// reference.
#[must_use]
pub fn build_reference(
    rows: &[Vec<f64>],
    feature_names: &[String],
    psi_bins: usize,
    n_ref_sample: usize,
    seed: u64,
) -> DriftReference {
    let mut psi = HashMap::new();
    for (j, name) in feature_names.iter().enumerate() {
        let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
        let edges = quantile_edges(&column, psi_bins);
        let expected = bin_frequencies(&column, &edges);
        psi.insert(name.clone(), PsiFeatureRef { edges, expected });
    }

    let ks_ref = seeded_sample(rows, n_ref_sample, seed);

    DriftReference {
        feature_names: feature_names.to_vec(),
        psi_bins,
        psi,
        ks_ref,
    }
}

/// Deterministic reservoir-style sample of up to `k` rows, seeded so the
/// same training data always yields the same reference sample.
fn seeded_sample(rows: &[Vec<f64>], k: usize, seed: u64) -> Vec<Vec<f64>> {
    if rows.len() <= k {
        return rows.to_vec();
    }
    let mut rng_state = seed.max(1);
    let mut next = move || {
        // xorshift64*
        rng_state ^= rng_state << 13;
        rng_state ^= rng_state >> 7;
        rng_state ^= rng_state << 17;
        rng_state
    };
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    for i in (1..indices.len()).rev() {
        let j = (next() as usize) % (i + 1);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices.into_iter().map(|i| rows[i].clone()).collect()
}

impl DriftReference {
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
    fn quantile_edges_are_strictly_increasing() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let edges = quantile_edges(&values, 10);
        for w in edges.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn quantile_edges_repair_repeated_values() {
        let values = vec![5.0; 50];
        let edges = quantile_edges(&values, 5);
        for w in edges.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn build_reference_produces_one_entry_per_feature() {
        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![f64::from(i), f64::from(i) * 2.0])
            .collect();
        let names = vec!["amount".to_string(), "velocity".to_string()];
        let reference = build_reference(&rows, &names, 5, 20, 7);
        assert_eq!(reference.psi.len(), 2);
        assert!(reference.ks_ref.len() <= 20);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drift_reference.json");
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![f64::from(i)]).collect();
        let names = vec!["amount".to_string()];
        let reference = build_reference(&rows, &names, 4, 10, 1);
        reference.save(&path).unwrap();
        let loaded = DriftReference::load(&path).unwrap();
        assert_eq!(reference, loaded);
    }
}
