//! HTTP serving surface: axum router, handlers, and wire DTOs.

pub mod dto;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full axum router, wired to `state` and layered with CORS and
/// request tracing.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.project.cors_origins);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/contracts/predict", get(handlers::contracts_predict))
        .route("/predict", post(handlers::predict))
        .route("/retrain", post(handlers::retrain))
        .route("/models/info", get(handlers::models_info))
        .route("/dashboard/stats", get(handlers::dashboard_stats))
        .route("/metrics", get(handlers::metrics))
        .route("/prometheus/*path", get(handlers::prometheus_proxy))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
}
