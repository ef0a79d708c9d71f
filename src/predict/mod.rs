//! Predict path: schema validation, classification, conformal prediction
//! set, drift scoring, and the serving-action decision, wired together for
//! one request against one bundle.
//!
//! A schema violation short-circuits everything below it: no vectorization,
//! no drift update, no retrain trigger — the request never touches the
//! model.

#![cfg(feature = "xgb")]

pub mod heuristic;

use std::collections::{BTreeMap, HashMap};

use crate::conformal::calib::prediction_set;
use crate::core::config::Config;
use crate::model::bundle::ModelBundle;
use crate::model::classifier::ProbabilisticClassifier;
use crate::policy::decision::{decide_action, ActionCode, REASON_DATA_CONTRACT};
use crate::policy::schema::{validate_request, vectorize, FeatureValue};
use crate::retrain::emitter::{RetrainEmitter, RetrainRequest};
use heuristic::fallback_risk_score;

/// Full outcome of one predict call, matching the response shape callers
/// (the HTTP handler, shadow-traffic comparison) need.
#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub prediction: Option<u8>,
    pub prediction_set: Vec<String>,
    pub p_fraud: Option<f64>,
    pub coverage: f64,
    pub action_code: ActionCode,
    pub reasons: Vec<String>,
    pub fallback_reason: Option<String>,
    pub fallback_risk: Option<(f64, &'static str)>,
    pub retrain_triggered: bool,
    pub retrain_reason: Option<String>,
    pub model_version: String,
    pub drift_score: f64,
    pub top_drifted_features: Vec<String>,
}

/// Run the predict pipeline for one bundle. `emitter` is `None` for shadow
/// evaluations, which score but never durably request a retrain.
pub fn run_predict<C: ProbabilisticClassifier>(
    bundle: &ModelBundle<C>,
    emitter: Option<&RetrainEmitter>,
    features: &HashMap<String, FeatureValue>,
    schema_version: i64,
    cfg: &Config,
) -> PredictOutcome {
    let coverage = 1.0 - cfg.conformal.alpha;
    let fallback_risk = amount_value(features).map(fallback_risk_score);

    if let Some(violation) = validate_request(
        features,
        &bundle.feature_names,
        schema_version,
        cfg.schema.version,
        cfg.schema.allow_extras,
    ) {
        return PredictOutcome {
            prediction: None,
            prediction_set: Vec::new(),
            p_fraud: None,
            coverage,
            action_code: ActionCode::Fallback,
            reasons: violation.reasons(),
            fallback_reason: Some(REASON_DATA_CONTRACT.to_string()),
            fallback_risk,
            retrain_triggered: false,
            retrain_reason: None,
            model_version: bundle.model_version.clone(),
            drift_score: 0.0,
            top_drifted_features: Vec::new(),
        };
    }

    let row = vectorize(features, &bundle.feature_names);
    let proba = bundle.calibrated_proba(&row);
    let set = prediction_set(&proba, &bundle.calib);

    let drift = bundle.drift.lock().update_and_score(&row);
    let hard_drift = drift.drift_score >= cfg.drift.hard_threshold;
    let trigger_result = bundle.trigger.lock().observe(hard_drift);

    let (action, reasons) = decide_action(
        set.len(),
        drift.drift_score,
        cfg.drift.soft_threshold,
        cfg.drift.hard_threshold,
    );

    let mut retrain_triggered = trigger_result.triggered;
    if retrain_triggered {
        retrain_triggered = emitter.is_some_and(|emitter| {
            let request = RetrainRequest {
                created_at_unix: 0,
                created_at: String::new(),
                reason: trigger_result.reason.clone().unwrap_or_default(),
                drift_score: drift.drift_score,
                model_version: bundle.model_version.clone(),
                action_code: action.as_str().to_string(),
                drift: drift_details(&drift),
                p_fraud: Some(proba[1]),
                request_id: None,
                extra: None,
            };
            emitter.emit(request).unwrap_or(false)
        });
    }

    let prediction = if set.len() == 1 && matches!(action, ActionCode::Predict | ActionCode::Monitor)
    {
        set[0].parse::<u8>().ok()
    } else {
        None
    };

    let fallback_reason = match action {
        ActionCode::Fallback | ActionCode::Abstain => reasons.first().cloned(),
        _ => None,
    };

    PredictOutcome {
        prediction,
        prediction_set: set,
        p_fraud: Some(proba[1]),
        coverage,
        action_code: action,
        reasons,
        fallback_reason,
        fallback_risk,
        retrain_triggered,
        retrain_reason: trigger_result.reason,
        model_version: bundle.model_version.clone(),
        drift_score: drift.drift_score,
        top_drifted_features: drift.top_drifted_features,
    }
}

fn amount_value(features: &HashMap<String, FeatureValue>) -> Option<f64> {
    features.iter().find_map(|(name, value)| {
        name.eq_ignore_ascii_case("amount")
            .then(|| value.as_finite_f64())
            .flatten()
    })
}

fn drift_details(result: &crate::drift::DriftResult) -> BTreeMap<String, serde_json::Value> {
    let mut details = BTreeMap::new();
    details.insert("psi_mean".to_string(), serde_json::json!(result.psi_mean));
    details.insert(
        "ks_flag_frac".to_string(),
        serde_json::json!(result.ks_flag_frac),
    );
    details.insert("soft_count".to_string(), serde_json::json!(result.soft_count));
    details.insert("hard_count".to_string(), serde_json::json!(result.hard_count));
    details.insert(
        "top_drifted_features".to_string(),
        serde_json::json!(result.top_drifted_features),
    );
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bundle::DriftTuning;
    use crate::model::classifier::{GbmClassifier, ProbabilisticClassifier};
    use crate::model::calibrator::IsotonicCalibrator;
    use crate::conformal::calib::fit_split_conformal;
    use crate::drift::reference::build_reference;

    fn feature_names() -> Vec<String> {
        vec!["amount".to_string(), "hour".to_string()]
    }

    fn bundle_in(dir: &std::path::Path) -> ModelBundle<GbmClassifier> {
        let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![f64::from(i), (i % 24) as f64]).collect();
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i % 3 == 0)).collect();
        let model = GbmClassifier::fit(&rows, &labels).unwrap();
        let version_dir = dir.join("v1");
        std::fs::create_dir_all(&version_dir).unwrap();
        model.save(&version_dir.join("xgb_model.json")).unwrap();

        let labels_f64: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();
        let raw_p1: Vec<f64> = rows.iter().map(|r| model.raw_proba(r)[1]).collect();
        let calibrator = IsotonicCalibrator::fit(&raw_p1, &labels_f64);
        calibrator.save(&version_dir.join("proba_calibrator.json")).unwrap();

        let calibrated_p1: Vec<f64> = raw_p1.iter().map(|&p| calibrator.predict_proba(p)[1]).collect();
        let pairs: Vec<[f64; 2]> = calibrated_p1.iter().map(|&p1| [1.0 - p1, p1]).collect();
        let calib = fit_split_conformal(&pairs, &labels, 0.1);
        calib.save(&version_dir.join("calib_meta.json")).unwrap();

        let reference = build_reference(&rows, &feature_names(), 4, 50, 7);
        reference.save(&version_dir.join("drift_reference.json")).unwrap();

        let tuning = DriftTuning {
            window_size: 500,
            stride: 50,
            min_window: 100,
            p_value_threshold: 0.05,
            feature_soft_threshold: 0.10,
            feature_hard_threshold: 0.25,
            top_k: 5,
        };
        ModelBundle::<GbmClassifier>::load(dir, "v1", tuning, 3).unwrap()
    }

    fn request(amount: f64, hour: f64) -> HashMap<String, FeatureValue> {
        let mut m = HashMap::new();
        m.insert("amount".to_string(), FeatureValue::Float(amount));
        m.insert("hour".to_string(), FeatureValue::Float(hour));
        m
    }

    #[test]
    fn schema_violation_short_circuits_with_data_contract() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = bundle_in(dir.path());
        let cfg = Config::default();
        let mut features = request(10.0, 5.0);
        features.remove("hour");

        let outcome = run_predict(&bundle, None, &features, cfg.schema.version, &cfg);
        assert_eq!(outcome.action_code, ActionCode::Fallback);
        assert_eq!(outcome.fallback_reason.as_deref(), Some("DATA_CONTRACT"));
        assert!(outcome.prediction.is_none());
        assert!(outcome.reasons.iter().any(|r| r.starts_with("MISSING_FEATURES:")));
    }

    #[test]
    fn conforming_request_with_low_drift_predicts() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = bundle_in(dir.path());
        let cfg = Config::default();
        let features = request(10.0, 5.0);

        let outcome = run_predict(&bundle, None, &features, cfg.schema.version, &cfg);
        assert!(outcome.p_fraud.is_some());
        assert!(outcome.model_version == "v1");
        if outcome.prediction_set.len() == 1 {
            assert!(matches!(outcome.action_code, ActionCode::Predict | ActionCode::Monitor));
        }
    }

    #[test]
    fn schema_violation_still_surfaces_amount_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = bundle_in(dir.path());
        let cfg = Config::default();
        let mut features = request(2500.0, 5.0);
        features.remove("hour");

        let outcome = run_predict(&bundle, None, &features, cfg.schema.version, &cfg);
        assert_eq!(outcome.fallback_risk, Some((0.90, "HIGH_AMOUNT")));
    }
}
