//! A model bundle: everything needed to serve one model version — the
//! classifier, its probability calibrator, its conformal calibration, and
//! its own drift detector (each version carries a drift reference fit from
//! its own training data).

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::conformal::ConformalCalib;
use crate::core::errors::{DsError, Result};
use crate::drift::{DriftDetector, DriftReference};
use crate::model::calibrator::IsotonicCalibrator;
use crate::model::classifier::ProbabilisticClassifier;
use crate::policy::RetrainTrigger;

const XGB_MODEL_FILE: &str = "xgb_model.json";
const CALIBRATOR_FILE: &str = "proba_calibrator.json";
const CALIB_META_FILE: &str = "calib_meta.json";
const DRIFT_REFERENCE_FILE: &str = "drift_reference.json";

/// Drift-detector tuning knobs needed to reconstruct a bundle's detector.
#[derive(Debug, Clone, Copy)]
pub struct DriftTuning {
    pub window_size: usize,
    pub stride: usize,
    pub min_window: usize,
    pub p_value_threshold: f64,
    pub feature_soft_threshold: f64,
    pub feature_hard_threshold: f64,
    pub top_k: usize,
}

/// A fully loaded, servable model version.
///
/// Generic over the classifier backend `C` — `ModelBundle` itself never
/// names a concrete classifier type, so a different `ProbabilisticClassifier`
/// implementation can serve without touching this struct; only the call
/// site that picks `C` changes.
///
/// `drift` and `trigger` carry the only mutable state in a bundle and are
/// each guarded by their own mutex: every predict call that touches this
/// bundle's detector locks briefly to fold one row in, never holding the
/// lock across anything else.
pub struct ModelBundle<C: ProbabilisticClassifier> {
    pub model_version: String,
    pub model: C,
    pub calibrator: IsotonicCalibrator,
    pub calib: ConformalCalib,
    pub drift: Mutex<DriftDetector>,
    pub trigger: Mutex<RetrainTrigger>,
    pub feature_names: Vec<String>,
}

impl<C: ProbabilisticClassifier> ModelBundle<C> {
    /// Load a bundle from `versions_dir/<version>/`. Fails naming the first
    /// missing artifact, never partially.
    pub fn load(
        versions_dir: &Path,
        version: &str,
        tuning: DriftTuning,
        required_hard_windows: u32,
    ) -> Result<Self> {
        let dir = versions_dir.join(version);
        let model_path = require_artifact(&dir, XGB_MODEL_FILE)?;
        let calibrator_path = require_artifact(&dir, CALIBRATOR_FILE)?;
        let calib_meta_path = require_artifact(&dir, CALIB_META_FILE)?;
        let drift_reference_path = require_artifact(&dir, DRIFT_REFERENCE_FILE)?;

        let model = C::load(&model_path)?;
        let calibrator = IsotonicCalibrator::load(&calibrator_path)?;
        let calib = ConformalCalib::load(&calib_meta_path)?;
        let reference = DriftReference::load(&drift_reference_path)?;
        let feature_names = reference.feature_names.clone();

        let drift = DriftDetector::new(
            reference,
            tuning.window_size,
            tuning.stride,
            tuning.min_window,
            tuning.p_value_threshold,
            tuning.feature_soft_threshold,
            tuning.feature_hard_threshold,
            tuning.top_k,
        );

        Ok(Self {
            model_version: version.to_string(),
            model,
            calibrator,
            calib,
            drift: Mutex::new(drift),
            trigger: Mutex::new(RetrainTrigger::new(required_hard_windows)),
            feature_names,
        })
    }

    /// Raw-then-calibrated probability for one feature row, ordered per
    /// `feature_names`.
    #[must_use]
    pub fn calibrated_proba(&self, row: &[f64]) -> [f64; 2] {
        let raw = self.model.raw_proba(row);
        self.calibrator.predict_proba(raw[1])
    }
}

fn require_artifact(dir: &Path, name: &'static str) -> Result<PathBuf> {
    let path = dir.join(name);
    if path.exists() {
        Ok(path)
    } else {
        Err(DsError::MissingArtifact {
            version_dir: dir.to_path_buf(),
            name,
        })
    }
}

#[cfg(all(test, feature = "xgb"))]
mod tests {
    use super::*;
    use crate::model::classifier::GbmClassifier;

    fn default_tuning() -> DriftTuning {
        DriftTuning {
            window_size: 500,
            stride: 50,
            min_window: 100,
            p_value_threshold: 0.05,
            feature_soft_threshold: 0.10,
            feature_hard_threshold: 0.25,
            top_k: 5,
        }
    }

    #[test]
    fn load_fails_naming_first_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let versions_dir = dir.path().join("versions");
        std::fs::create_dir_all(versions_dir.join("v1")).unwrap();
        let err = ModelBundle::<GbmClassifier>::load(&versions_dir, "v1", default_tuning(), 3).unwrap_err();
        assert_eq!(err.code(), "DS-2001");
        assert!(err.to_string().contains(XGB_MODEL_FILE));
    }
}
