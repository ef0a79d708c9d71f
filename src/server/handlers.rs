//! HTTP handlers for the serving surface (spec section 6).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::Lazy;
use rand::Rng as _;

use crate::core::errors::DsError;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::metrics::METRICS;
use crate::policy::decision::REASON_DATA_CONTRACT;
use crate::predict::run_predict;
use crate::retrain::RetrainRequest;
use crate::server::dto::{
    ContractResponse, DashboardStatsResponse, ErrorResponse, HealthResponse, ModelsInfoResponse,
    PredictRequest, PredictResponse, ReadyResponse, RetrainAck,
};
use crate::server::state::AppState;

#[cfg(feature = "sqlite")]
use crate::logger::sqlite::DecisionRow;

const CONTRACT_VERSION: i64 = 1;

fn error_response(status: StatusCode, err: &DsError) -> Response {
    (
        status,
        Json(ErrorResponse {
            error_code: err.code().to_string(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.manager.active_version().is_some();
    Json(HealthResponse {
        status: "ok",
        service: "drift_shield",
        ready,
    })
}

pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.manager.get_active() {
        Ok(bundle) => Json(ReadyResponse {
            ready: true,
            detail: "ok".to_string(),
            active_model_version: Some(bundle.model_version.clone()),
            shadow_model_version: state.manager.get_shadow().map(|s| s.model_version.clone()),
        })
        .into_response(),
        Err(e) => Json(ReadyResponse {
            ready: false,
            detail: e.to_string(),
            active_model_version: None,
            shadow_model_version: None,
        })
        .into_response(),
    }
}

pub async fn contracts_predict(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ContractResponse {
        contract_version: CONTRACT_VERSION,
        schema_version: state.config.schema.version,
        action_codes: vec!["PREDICT", "MONITOR", "FALLBACK", "ABSTAIN", "MANUAL"],
        reason_codes: vec![
            "DATA_CONTRACT",
            "CONFORMAL_UNCERTAIN",
            "HARD_DRIFT",
            "SOFT_DRIFT",
            "PREDICTION_ERROR",
        ],
        notes: vec!["prediction is non-null iff |prediction_set|=1 and action is PREDICT or MONITOR"],
    })
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictRequest>,
) -> Response {
    let start = Instant::now();

    let active = match state.manager.get_active() {
        Ok(bundle) => bundle,
        Err(e) => {
            METRICS.requests_total.with_label_values(&["unavailable"]).inc();
            return error_response(StatusCode::SERVICE_UNAVAILABLE, &e);
        }
    };

    let outcome = run_predict(
        &active,
        Some(&state.emitter),
        &req.transaction_features,
        req.schema_version,
        &state.config,
    );

    let mut shadow_disagree = false;
    if state.config.shadow.sampling_rate > 0.0 {
        if let Some(shadow) = state.manager.get_shadow() {
            if rand::rng().random_bool(state.config.shadow.sampling_rate.clamp(0.0, 1.0)) {
                METRICS.shadow_runs_total.inc();
                let shadow_outcome = run_predict(
                    &shadow,
                    None,
                    &req.transaction_features,
                    req.schema_version,
                    &state.config,
                );
                shadow_disagree = shadow_outcome.prediction_set != outcome.prediction_set
                    || shadow_outcome.action_code != outcome.action_code;
                if shadow_disagree {
                    METRICS.shadow_disagree_total.inc();
                }
            }
        }
    }

    let is_schema_rejection = outcome
        .fallback_reason
        .as_deref()
        .is_some_and(|r| r == REASON_DATA_CONTRACT);
    if is_schema_rejection {
        METRICS.schema_rejected_total.inc();
    }
    METRICS
        .action_total
        .with_label_values(&[outcome.action_code.as_str()])
        .inc();
    METRICS.requests_total.with_label_values(&["ok"]).inc();
    METRICS.drift_score.observe(outcome.drift_score);
    if let Some(p) = outcome.p_fraud {
        METRICS.p_fraud.observe(p);
    }
    if outcome.retrain_triggered {
        METRICS.retrain_triggered_total.inc();
        METRICS.retrain_emitted_total.inc();
    }

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    METRICS.predict_latency_seconds.observe(latency_ms / 1000.0);

    let mut entry = LogEntry::new(
        if is_schema_rejection {
            EventType::SchemaRejected
        } else {
            EventType::PredictionServed
        },
        Severity::Info,
    );
    entry.model_version = Some(outcome.model_version.clone());
    entry.drift_score = Some(outcome.drift_score);
    entry.action_code = Some(outcome.action_code.as_str().to_string());
    entry.reason = outcome.fallback_reason.clone();
    entry.duration_ms = Some(latency_ms as u64);
    entry.ok = Some(true);
    state.jsonl.lock().write_entry(&entry);

    #[cfg(feature = "sqlite")]
    if let Some(sqlite) = state.sqlite.as_ref() {
        let _ = sqlite.log_decision(&DecisionRow {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            model_version: outcome.model_version.clone(),
            action_code: outcome.action_code.as_str().to_string(),
            drift_score: outcome.drift_score,
            p_fraud: outcome.p_fraud,
            latency_ms,
            shadow_disagree,
        });
    }

    Json(PredictResponse::from(outcome)).into_response()
}

pub async fn retrain(State(state): State<Arc<AppState>>) -> Response {
    let model_version = state.manager.active_version().unwrap_or_default();
    let request = RetrainRequest {
        created_at_unix: 0,
        created_at: String::new(),
        reason: "MANUAL_RETRAIN".to_string(),
        drift_score: 0.0,
        model_version,
        action_code: "MANUAL".to_string(),
        drift: std::collections::BTreeMap::new(),
        p_fraud: None,
        request_id: None,
        extra: None,
    };

    match state.emitter.emit(request) {
        Ok(true) => {
            METRICS.retrain_emitted_total.inc();
            (
                StatusCode::OK,
                Json(RetrainAck {
                    accepted: true,
                    reason: "queued",
                }),
            )
                .into_response()
        }
        Ok(false) => {
            METRICS.retrain_throttled_total.inc();
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RetrainAck {
                    accepted: false,
                    reason: "throttled",
                }),
            )
                .into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

pub async fn models_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ModelsInfoResponse {
        active_model_version: state.manager.active_version(),
        shadow_model_version: state.manager.shadow_version(),
        soft_threshold: state.config.drift.soft_threshold,
        hard_threshold: state.config.drift.hard_threshold,
        coverage: 1.0 - state.config.conformal.alpha,
    })
}

pub async fn dashboard_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    #[cfg(feature = "sqlite")]
    {
        if let Some(sqlite) = state.sqlite.as_ref() {
            if let Ok((count, mean)) = sqlite.recent_decision_summary(1000) {
                return Json(DashboardStatsResponse {
                    recent_decisions: count,
                    recent_mean_drift_score: mean,
                });
            }
        }
    }
    let _ = &state;
    Json(DashboardStatsResponse {
        recent_decisions: 0,
        recent_mean_drift_score: 0.0,
    })
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.render(),
    )
}

static PROXY_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

pub async fn prometheus_proxy(Path(path): Path<String>) -> Response {
    let Ok(base) = std::env::var("PROMETHEUS_URL") else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &DsError::ModelServiceUnavailable {
                details: "PROMETHEUS_URL is not configured".to_string(),
            },
        );
    };
    let url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));

    match PROXY_CLIENT.get(&url).send().await {
        Ok(upstream) => {
            let status = upstream.status();
            match upstream.bytes().await {
                Ok(body) => (status, body).into_response(),
                Err(e) => error_response(
                    StatusCode::BAD_GATEWAY,
                    &DsError::ModelServiceUnavailable { details: e.to_string() },
                ),
            }
        }
        Err(e) => error_response(
            StatusCode::BAD_GATEWAY,
            &DsError::ModelServiceUnavailable { details: e.to_string() },
        ),
    }
}
