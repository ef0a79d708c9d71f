//! Wire DTOs for the HTTP surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::policy::schema::FeatureValue;
use crate::predict::PredictOutcome;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub schema_version: i64,
    pub transaction_features: HashMap<String, FeatureValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftInfo {
    pub score: f64,
    pub top_drifted_features: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub prediction: Option<u8>,
    pub prediction_set: Vec<String>,
    pub p_fraud: Option<f64>,
    pub coverage: f64,
    pub action_code: String,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_risk: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_risk_band: Option<&'static str>,
    pub retrain_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrain_reason: Option<String>,
    pub model_version: String,
    pub drift: DriftInfo,
}

impl From<PredictOutcome> for PredictResponse {
    fn from(outcome: PredictOutcome) -> Self {
        Self {
            prediction: outcome.prediction,
            prediction_set: outcome.prediction_set,
            p_fraud: outcome.p_fraud,
            coverage: outcome.coverage,
            action_code: outcome.action_code.as_str().to_string(),
            reasons: outcome.reasons,
            fallback_reason: outcome.fallback_reason,
            fallback_risk: outcome.fallback_risk.map(|(score, _)| score),
            fallback_risk_band: outcome.fallback_risk.map(|(_, band)| band),
            retrain_triggered: outcome.retrain_triggered,
            retrain_reason: outcome.retrain_reason,
            model_version: outcome.model_version,
            drift: DriftInfo {
                score: outcome.drift_score,
                top_drifted_features: outcome.top_drifted_features,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_model_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContractResponse {
    pub contract_version: i64,
    pub schema_version: i64,
    pub action_codes: Vec<&'static str>,
    pub reason_codes: Vec<&'static str>,
    pub notes: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ModelsInfoResponse {
    pub active_model_version: Option<String>,
    pub shadow_model_version: Option<String>,
    pub soft_threshold: f64,
    pub hard_threshold: f64,
    pub coverage: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStatsResponse {
    pub recent_decisions: u64,
    pub recent_mean_drift_score: f64,
}

#[derive(Debug, Serialize)]
pub struct RetrainAck {
    pub accepted: bool,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
}
