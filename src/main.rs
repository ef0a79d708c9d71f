#![forbid(unsafe_code)]

//! `driftshieldd` — Drift Shield server entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use drift_shield::core::config::Config;
use drift_shield::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use drift_shield::model::DriftTuning;
use drift_shield::registry::BundleManager;
use drift_shield::retrain::RetrainEmitter;
use drift_shield::server::state::AppState;

#[cfg(feature = "sqlite")]
use drift_shield::logger::sqlite::SqliteLogger;

#[cfg(feature = "xgb")]
use drift_shield::retrain::RetrainWorker;

/// Drift Shield serving daemon.
#[derive(Debug, Parser)]
struct Cli {
    /// Path to `config.toml`. Falls back to `DRIFT_SHIELD_CONFIG`, then `./config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Bind address for the HTTP server.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("driftshieldd: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let tuning = DriftTuning {
        window_size: cfg.drift.window_size,
        stride: cfg.drift.stride,
        min_window: cfg.drift.min_window,
        p_value_threshold: cfg.drift.p_value_threshold,
        feature_soft_threshold: cfg.drift.soft_threshold,
        feature_hard_threshold: cfg.drift.hard_threshold,
        top_k: cfg.drift.top_k_drifted,
    };

    let manager = Arc::new(BundleManager::new(
        cfg.paths.versions_dir.clone(),
        cfg.paths.active_ptr.clone(),
        cfg.paths.shadow_ptr.clone(),
        tuning,
        cfg.promote.required_hard_windows,
    ));

    let emitter = Arc::new(RetrainEmitter::new(
        cfg.paths.requests_dir.clone(),
        cfg.retrain.cooldown_seconds,
        cfg.retrain.max_pending,
    ));

    let jsonl = JsonlWriter::open(JsonlConfig {
        path: cfg.paths.reports_dir.join("events.jsonl"),
        ..JsonlConfig::default()
    });

    #[cfg(feature = "sqlite")]
    let sqlite = SqliteLogger::open(&cfg.paths.reports_dir.join("stats.db"))
        .map_err(|e| eprintln!("driftshieldd: sqlite logger unavailable: {e}"))
        .ok();

    let state = Arc::new(AppState::new(
        manager,
        emitter,
        cfg.clone(),
        jsonl,
        #[cfg(feature = "sqlite")]
        sqlite,
    ));

    state
        .jsonl
        .lock()
        .write_entry(&LogEntry::new(EventType::ServerStart, Severity::Info));

    #[cfg(feature = "xgb")]
    {
        let worker_cfg = cfg.clone();
        tokio::spawn(async move {
            let worker = RetrainWorker::new(worker_cfg.clone());
            let mut interval = tokio::time::interval(std::time::Duration::from_secs_f64(
                worker_cfg.promote.poll_seconds.max(0.1),
            ));
            loop {
                interval.tick().await;
                if let Err(e) = worker.run_once() {
                    eprintln!("driftshieldd: retrain worker error: {e}");
                }
            }
        });
    }

    let router = drift_shield::server::build_router(state.clone());

    let listener = match tokio::net::TcpListener::bind(&cli.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("driftshieldd: failed to bind {}: {e}", cli.bind);
            std::process::exit(1);
        }
    };

    eprintln!("driftshieldd: listening on {}", cli.bind);

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("driftshieldd: server error: {e}");
    }

    state
        .jsonl
        .lock()
        .write_entry(&LogEntry::new(EventType::ServerStop, Severity::Info));
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
