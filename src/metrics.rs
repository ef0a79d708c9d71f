//! Process-wide Prometheus metrics. One lazily-initialized registry feeds
//! both `GET /metrics` and the internal counters updated on the predict and
//! retrain-worker paths.

#![allow(missing_docs)]

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// All metrics this service exposes, registered once at process start.
pub struct Metrics {
    pub registry: Registry,
    pub requests_total: IntCounterVec,
    pub action_total: IntCounterVec,
    pub schema_rejected_total: IntCounter,
    pub drift_score: Histogram,
    pub p_fraud: Histogram,
    pub feature_soft_drift_total: IntCounter,
    pub feature_hard_drift_total: IntCounter,
    pub retrain_triggered_total: IntCounter,
    pub retrain_emitted_total: IntCounter,
    pub retrain_throttled_total: IntCounter,
    pub shadow_runs_total: IntCounter,
    pub shadow_disagree_total: IntCounter,
    pub predict_latency_seconds: Histogram,
    pub bundle_swap_total: IntCounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("ds_requests_total", "Total predict requests served"),
            &["outcome"],
        )
        .expect("metric definition is valid");
        let action_total = IntCounterVec::new(
            Opts::new("ds_action_total", "Predict requests by decided action code"),
            &["action_code"],
        )
        .expect("metric definition is valid");
        let schema_rejected_total = IntCounter::new(
            "ds_schema_rejected_total",
            "Requests rejected by schema-contract validation",
        )
        .expect("metric definition is valid");
        let drift_score = Histogram::with_opts(HistogramOpts::new(
            "ds_drift_score",
            "Distribution of per-request drift scores",
        ))
        .expect("metric definition is valid");
        let p_fraud = Histogram::with_opts(HistogramOpts::new(
            "ds_p_fraud",
            "Distribution of calibrated fraud probabilities",
        ))
        .expect("metric definition is valid");
        let feature_soft_drift_total = IntCounter::new(
            "ds_feature_soft_drift_total",
            "Feature-level soft-drift flags observed",
        )
        .expect("metric definition is valid");
        let feature_hard_drift_total = IntCounter::new(
            "ds_feature_hard_drift_total",
            "Feature-level hard-drift flags observed",
        )
        .expect("metric definition is valid");
        let retrain_triggered_total = IntCounter::new(
            "ds_retrain_triggered_total",
            "Times the consecutive-hard-drift retrain trigger fired",
        )
        .expect("metric definition is valid");
        let retrain_emitted_total = IntCounter::new(
            "ds_retrain_emitted_total",
            "Retrain requests durably written to the queue",
        )
        .expect("metric definition is valid");
        let retrain_throttled_total = IntCounter::new(
            "ds_retrain_throttled_total",
            "Retrain requests refused by emitter cooldown/backlog",
        )
        .expect("metric definition is valid");
        let shadow_runs_total = IntCounter::new(
            "ds_shadow_runs_total",
            "Requests that also scored the shadow bundle",
        )
        .expect("metric definition is valid");
        let shadow_disagree_total = IntCounter::new(
            "ds_shadow_disagree_total",
            "Shadow runs whose action or prediction set disagreed with active",
        )
        .expect("metric definition is valid");
        let predict_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "ds_predict_latency_seconds",
            "Predict request handling latency",
        ))
        .expect("metric definition is valid");
        let bundle_swap_total = IntCounterVec::new(
            Opts::new("ds_bundle_swap_total", "Bundle manager pointer swaps by outcome"),
            &["slot", "outcome"],
        )
        .expect("metric definition is valid");

        for c in [&requests_total, &action_total, &bundle_swap_total] {
            registry
                .register(Box::new(c.clone()))
                .expect("metric registration succeeds exactly once");
        }
        for c in [&schema_rejected_total, &feature_soft_drift_total, &feature_hard_drift_total, &retrain_triggered_total, &retrain_emitted_total, &retrain_throttled_total, &shadow_runs_total, &shadow_disagree_total] {
            registry
                .register(Box::new(c.clone()))
                .expect("metric registration succeeds exactly once");
        }
        for h in [&drift_score, &p_fraud, &predict_latency_seconds] {
            registry
                .register(Box::new(h.clone()))
                .expect("metric registration succeeds exactly once");
        }

        Self {
            registry,
            requests_total,
            action_total,
            schema_rejected_total,
            drift_score,
            p_fraud,
            feature_soft_drift_total,
            feature_hard_drift_total,
            retrain_triggered_total,
            retrain_emitted_total,
            retrain_throttled_total,
            shadow_runs_total,
            shadow_disagree_total,
            predict_latency_seconds,
            bundle_swap_total,
        }
    }

    /// Render the current registry as Prometheus text exposition format.
    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buf)
            .expect("prometheus text encoding never fails for well-formed metrics");
        String::from_utf8(buf).unwrap_or_default()
    }
}

/// Process-wide metrics singleton.
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);
