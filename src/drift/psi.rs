//! Population Stability Index between an expected (reference) distribution
//! and an actual (live) distribution over the same bin edges.

const PSI_CLIP_MIN: f64 = 1e-6;
const PSI_CLIP_MAX: f64 = 1.0;

/// PSI between two bin-frequency distributions of equal length:
/// `sum((actual - expected) * ln(actual / expected))`, with both arrays
/// clipped to `[1e-6, 1.0]` to avoid `ln(0)`/division-by-zero on empty bins.
#[must_use]
pub fn psi(expected: &[f64], actual: &[f64]) -> f64 {
    assert_eq!(expected.len(), actual.len());
    expected
        .iter()
        .zip(actual)
        .map(|(&e, &a)| {
            let e = e.clamp(PSI_CLIP_MIN, PSI_CLIP_MAX);
            let a = a.clamp(PSI_CLIP_MIN, PSI_CLIP_MAX);
            (a - e) * (a / e).ln()
        })
        .sum()
}

/// Bin a sorted-edges histogram of `values` into `edges.len() - 1` buckets,
/// returning normalized frequencies. Matches `np.histogram`: a value outside
/// `[edges[0], edges[last]]` is dropped from both the bin counts and the
/// normalizing total, rather than clamped into the edge bin — live values
/// drifting outside the reference range is exactly the case PSI exists to
/// catch, so folding them into the edge bins would mute the signal.
#[must_use]
pub fn bin_frequencies(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let n_bins = edges.len().saturating_sub(1);
    let mut counts = vec![0u64; n_bins];
    let mut in_range = 0u64;
    for &v in values {
        if let Some(bin) = locate_bin(v, edges) {
            counts[bin] += 1;
            in_range += 1;
        }
    }
    let total = in_range.max(1) as f64;
    counts.into_iter().map(|c| c as f64 / total).collect()
}

/// Returns the bin index for `v`, or `None` if `v` falls outside
/// `[edges[0], edges[last]]`.
fn locate_bin(v: f64, edges: &[f64]) -> Option<usize> {
    let n_bins = edges.len() - 1;
    if v < edges[0] || v > edges[n_bins] {
        return None;
    }
    if v >= edges[n_bins] {
        return Some(n_bins - 1);
    }
    for i in 0..n_bins {
        if v >= edges[i] && v < edges[i + 1] {
            return Some(i);
        }
    }
    Some(n_bins - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_distributions_have_zero_psi() {
        let dist = vec![0.25, 0.25, 0.25, 0.25];
        assert!(psi(&dist, &dist).abs() < 1e-12);
    }

    #[test]
    fn shifted_distribution_has_positive_psi() {
        let expected = vec![0.25, 0.25, 0.25, 0.25];
        let actual = vec![0.05, 0.05, 0.05, 0.85];
        assert!(psi(&expected, &actual) > 0.1);
    }

    #[test]
    fn bin_frequencies_sum_to_one() {
        let edges = vec![0.0, 1.0, 2.0, 3.0];
        let values = vec![0.1, 0.5, 1.2, 1.8, 2.9, 2.99];
        let freqs = bin_frequencies(&values, &edges);
        let sum: f64 = freqs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_values_are_dropped_not_clamped() {
        let edges = vec![0.0, 1.0, 2.0];
        let freqs = bin_frequencies(&[-5.0, 50.0, 0.5], &edges);
        // Only the in-range 0.5 counts; the out-of-range pair is excluded
        // from both the bin counts and the normalizing total.
        assert!((freqs[0] - 1.0).abs() < 1e-9);
        assert!(freqs[1].abs() < 1e-9);
    }

    #[test]
    fn all_out_of_range_values_yield_all_zero_frequencies() {
        let edges = vec![0.0, 1.0, 2.0];
        let freqs = bin_frequencies(&[-5.0, 50.0], &edges);
        assert!(freqs.iter().all(|&f| f.abs() < 1e-9));
    }
}
