//! End-to-end predict-path tests: build a real bundle on disk, serve it
//! through the registry, and exercise the schema/conformal/drift/decision
//! pipeline as a whole.

#![cfg(feature = "xgb")]

use std::collections::HashMap;
use std::path::Path;

use drift_shield::conformal::calib::fit_split_conformal;
use drift_shield::core::config::Config;
use drift_shield::drift::reference::build_reference;
use drift_shield::model::calibrator::IsotonicCalibrator;
use drift_shield::model::classifier::{GbmClassifier, ProbabilisticClassifier};
use drift_shield::model::DriftTuning;
use drift_shield::policy::schema::FeatureValue;
use drift_shield::predict::run_predict;
use drift_shield::registry::pointers::{write_pointer, PointerKind};
use drift_shield::registry::BundleManager;

const FEATURES: &[&str] = &["amount", "hour"];

fn feature_names() -> Vec<String> {
    FEATURES.iter().map(|s| (*s).to_string()).collect()
}

fn build_version(versions_dir: &Path, version: &str, tuning_bins: usize) {
    let rows: Vec<Vec<f64>> = (0..120)
        .map(|i| vec![f64::from(i % 50) * 10.0, f64::from(i % 24)])
        .collect();
    let labels: Vec<u8> = (0..120).map(|i| u8::from(i % 5 == 0)).collect();

    let model = GbmClassifier::fit(&rows, &labels).unwrap();
    let dir = versions_dir.join(version);
    std::fs::create_dir_all(&dir).unwrap();
    model.save(&dir.join("xgb_model.json")).unwrap();

    let labels_f64: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();
    let raw_p1: Vec<f64> = rows.iter().map(|r| model.raw_proba(r)[1]).collect();
    let calibrator = IsotonicCalibrator::fit(&raw_p1, &labels_f64);
    calibrator.save(&dir.join("proba_calibrator.json")).unwrap();

    let calibrated_p1: Vec<f64> = raw_p1.iter().map(|&p| calibrator.predict_proba(p)[1]).collect();
    let pairs: Vec<[f64; 2]> = calibrated_p1.iter().map(|&p1| [1.0 - p1, p1]).collect();
    let calib = fit_split_conformal(&pairs, &labels, 0.1);
    calib.save(&dir.join("calib_meta.json")).unwrap();

    let reference = build_reference(&rows, &feature_names(), tuning_bins, 100, 7);
    reference.save(&dir.join("drift_reference.json")).unwrap();
}

fn tuning() -> DriftTuning {
    DriftTuning {
        window_size: 200,
        stride: 20,
        min_window: 40,
        p_value_threshold: 0.05,
        feature_soft_threshold: 0.10,
        feature_hard_threshold: 0.25,
        top_k: 5,
    }
}

fn request(amount: f64, hour: f64) -> HashMap<String, FeatureValue> {
    let mut m = HashMap::new();
    m.insert("amount".to_string(), FeatureValue::Float(amount));
    m.insert("hour".to_string(), FeatureValue::Float(hour));
    m
}

#[test]
fn conforming_request_yields_a_coherent_response() {
    let dir = tempfile::tempdir().unwrap();
    let versions_dir = dir.path().join("versions");
    build_version(&versions_dir, "v1", 4);

    let manager: BundleManager<GbmClassifier> = BundleManager::new(
        versions_dir,
        dir.path().join("ACTIVE_MODEL.json"),
        dir.path().join("SHADOW_MODEL.json"),
        tuning(),
        3,
    );
    write_pointer(&dir.path().join("ACTIVE_MODEL.json"), "v1", PointerKind::Active).unwrap();

    let bundle = manager.get_active().unwrap();
    let cfg = Config::default();

    let outcome = run_predict(&bundle, None, &request(150.0, 13.0), 1, &cfg);

    assert_eq!(outcome.coverage, 1.0 - cfg.conformal.alpha);
    // prediction is non-null iff the set is a singleton and action allows it.
    let singleton = outcome.prediction_set.len() == 1;
    assert_eq!(
        outcome.prediction.is_some(),
        singleton
            && matches!(
                outcome.action_code,
                drift_shield::policy::ActionCode::Predict | drift_shield::policy::ActionCode::Monitor
            )
    );
    assert_eq!(outcome.model_version, "v1");
    // drift detector hasn't reached min_window yet on the first call.
    assert_eq!(outcome.drift_score, 0.0);
}

#[test]
fn schema_violation_short_circuits_before_touching_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let versions_dir = dir.path().join("versions");
    build_version(&versions_dir, "v1", 4);

    let manager: BundleManager<GbmClassifier> = BundleManager::new(
        versions_dir,
        dir.path().join("ACTIVE_MODEL.json"),
        dir.path().join("SHADOW_MODEL.json"),
        tuning(),
        3,
    );
    write_pointer(&dir.path().join("ACTIVE_MODEL.json"), "v1", PointerKind::Active).unwrap();
    let bundle = manager.get_active().unwrap();
    let cfg = Config::default();

    let mut incomplete = request(150.0, 13.0);
    incomplete.remove("hour");

    let outcome = run_predict(&bundle, None, &incomplete, 1, &cfg);

    assert_eq!(outcome.action_code, drift_shield::policy::ActionCode::Fallback);
    assert_eq!(outcome.fallback_reason.as_deref(), Some("DATA_CONTRACT"));
    assert!(outcome.prediction.is_none());
    assert_eq!(outcome.drift_score, 0.0);
    assert!(outcome.top_drifted_features.is_empty());
    assert!(!outcome.retrain_triggered);
}

#[test]
fn schema_violation_still_reports_the_amount_heuristic() {
    let dir = tempfile::tempdir().unwrap();
    let versions_dir = dir.path().join("versions");
    build_version(&versions_dir, "v1", 4);

    let manager: BundleManager<GbmClassifier> = BundleManager::new(
        versions_dir,
        dir.path().join("ACTIVE_MODEL.json"),
        dir.path().join("SHADOW_MODEL.json"),
        tuning(),
        3,
    );
    write_pointer(&dir.path().join("ACTIVE_MODEL.json"), "v1", PointerKind::Active).unwrap();
    let bundle = manager.get_active().unwrap();
    let cfg = Config::default();

    let mut incomplete = request(2500.0, 13.0);
    incomplete.remove("hour");

    let outcome = run_predict(&bundle, None, &incomplete, 1, &cfg);

    assert_eq!(outcome.fallback_risk, Some((0.90, "HIGH_AMOUNT")));
}

#[test]
fn bundle_manager_keeps_serving_last_good_version_on_bad_pointer() {
    let dir = tempfile::tempdir().unwrap();
    let versions_dir = dir.path().join("versions");
    build_version(&versions_dir, "v1", 4);

    let manager: BundleManager<GbmClassifier> = BundleManager::new(
        versions_dir,
        dir.path().join("ACTIVE_MODEL.json"),
        dir.path().join("SHADOW_MODEL.json"),
        tuning(),
        3,
    );
    write_pointer(&dir.path().join("ACTIVE_MODEL.json"), "v1", PointerKind::Active).unwrap();
    let first = manager.get_active().unwrap();
    assert_eq!(first.model_version, "v1");

    // Point at a version whose artifacts don't exist; the manager must keep
    // serving the cached v1 bundle rather than erroring or serving nothing.
    write_pointer(&dir.path().join("ACTIVE_MODEL.json"), "v2-missing", PointerKind::Active).unwrap();
    let second = manager.get_active().unwrap();
    assert_eq!(second.model_version, "v1");
}

#[test]
fn drift_score_stays_zero_until_the_window_warms_up() {
    let dir = tempfile::tempdir().unwrap();
    let versions_dir = dir.path().join("versions");
    build_version(&versions_dir, "v1", 4);

    let manager: BundleManager<GbmClassifier> = BundleManager::new(
        versions_dir,
        dir.path().join("ACTIVE_MODEL.json"),
        dir.path().join("SHADOW_MODEL.json"),
        tuning(),
        3,
    );
    write_pointer(&dir.path().join("ACTIVE_MODEL.json"), "v1", PointerKind::Active).unwrap();
    let bundle = manager.get_active().unwrap();
    let cfg = Config::default();

    // min_window is 40; issue fewer requests than that and confirm the
    // drift score hasn't been computed yet on any of them.
    for i in 0..10 {
        let outcome = run_predict(&bundle, None, &request(f64::from(i) * 5.0, f64::from(i)), 1, &cfg);
        assert_eq!(outcome.drift_score, 0.0);
    }
}
