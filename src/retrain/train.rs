//! Candidate training pipeline: fit classifier, probability calibrator,
//! split-conformal calibration, and rebuild the drift reference, then
//! persist everything under `versions_dir/<version>/`.

use std::path::{Path, PathBuf};

use crate::conformal::calib::fit_split_conformal;
use crate::core::errors::{DsError, Result};
use crate::drift::reference::build_reference;
use crate::model::calibrator::IsotonicCalibrator;
use crate::model::classifier::ProbabilisticClassifier;
use crate::retrain::dataset::RetrainDataset;

const N_REF_SAMPLE: usize = 2000;

/// Train one candidate model version from a blended retrain dataset and
/// persist its bundle artifacts.
///
/// # Errors
/// Returns an error if the classifier fails to fit/save, or any artifact
/// write fails.
pub fn train_and_save<C: ProbabilisticClassifier>(
    dataset: &RetrainDataset,
    versions_dir: &Path,
    version: &str,
    alpha: f64,
    psi_bins: usize,
    seed: u64,
) -> Result<PathBuf> {
    let dir = versions_dir.join(version);
    std::fs::create_dir_all(&dir).map_err(|e| DsError::io(&dir, e))?;

    let train_labels: Vec<u8> = dataset.train.labels.iter().map(|&l| l as u8).collect();
    let classifier = C::fit(&dataset.train.rows, &train_labels)?;
    classifier.save(&dir.join("xgb_model.json"))?;

    let raw_p1: Vec<f64> = dataset
        .calib
        .rows
        .iter()
        .map(|row| classifier.raw_proba(row)[1])
        .collect();
    let calibrator = IsotonicCalibrator::fit(&raw_p1, &dataset.calib.labels);
    calibrator.save(&dir.join("proba_calibrator.json"))?;

    let calibrated_p1: Vec<f64> = raw_p1
        .iter()
        .map(|&p| calibrator.predict_proba(p)[1])
        .collect();
    let proba_pairs: Vec<[f64; 2]> = calibrated_p1.iter().map(|&p1| [1.0 - p1, p1]).collect();
    let calib_labels: Vec<u8> = dataset.calib.labels.iter().map(|&l| l as u8).collect();
    let calib = fit_split_conformal(&proba_pairs, &calib_labels, alpha);
    calib.save(&dir.join("calib_meta.json"))?;

    let reference = build_reference(
        &dataset.train.rows,
        &dataset.feature_names,
        psi_bins,
        N_REF_SAMPLE,
        seed,
    );
    reference.save(&dir.join("drift_reference.json"))?;

    Ok(dir)
}

/// Generate a lexicographically sortable version id from the current time,
/// so "take the lexicographically smallest pending request" and "newest
/// version wins" comparisons agree with chronological order.
#[must_use]
pub fn new_version_id() -> String {
    format!("v_{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ"))
}
