#![forbid(unsafe_code)]

//! `dsctl` — operator CLI for inspecting and nudging a running Drift Shield
//! deployment: pointer status, manual promotion/rollback, manual retrain.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use drift_shield::core::config::Config;
use drift_shield::registry::pointers::{read_pointer, write_pointer, PointerKind};
use drift_shield::retrain::{RetrainEmitter, RetrainRequest};

#[cfg(feature = "sqlite")]
use drift_shield::logger::sqlite::SqliteLogger;

#[derive(Debug, Parser)]
#[command(name = "dsctl", about = "Drift Shield operator CLI")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print active/shadow/rollback pointer versions and recent decision stats.
    Status,
    /// Point the active, shadow, or rollback slot at a specific version.
    Promote {
        #[arg(long, conflicts_with_all = ["shadow", "rollback"])]
        active: Option<String>,
        #[arg(long, conflicts_with_all = ["active", "rollback"])]
        shadow: Option<String>,
        /// Swap the currently recorded rollback version back into active.
        #[arg(long, conflicts_with_all = ["active", "shadow"])]
        rollback: bool,
    },
    /// Enqueue a manual retrain request, same as `POST /retrain`.
    RetrainNow,
}

fn main() {
    let cli = Cli::parse();

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("dsctl: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Status => status(&cfg),
        Command::Promote {
            active,
            shadow,
            rollback,
        } => promote(&cfg, active, shadow, rollback),
        Command::RetrainNow => retrain_now(&cfg),
    };

    if let Err(e) = result {
        eprintln!("dsctl: {e}");
        std::process::exit(1);
    }
}

fn status(cfg: &Config) -> drift_shield::core::errors::Result<()> {
    let active = read_pointer(&cfg.paths.active_ptr, 3, PointerKind::Active)?;
    let shadow = read_pointer(&cfg.paths.shadow_ptr, 3, PointerKind::Shadow)?;
    let rollback = read_pointer(&cfg.paths.rollback_ptr, 3, PointerKind::Rollback)?;

    println!("active:   {}", active.as_deref().unwrap_or("(none)"));
    println!("shadow:   {}", shadow.as_deref().unwrap_or("(none)"));
    println!("rollback: {}", rollback.as_deref().unwrap_or("(none)"));

    #[cfg(feature = "sqlite")]
    {
        let db_path = cfg.paths.reports_dir.join("stats.db");
        if db_path.exists() {
            let logger = SqliteLogger::open(&db_path)?;
            let (count, mean_drift) = logger.recent_decision_summary(1000)?;
            println!("recent decisions: {count} (mean drift score {mean_drift:.4})");
        }
    }

    Ok(())
}

fn promote(
    cfg: &Config,
    active: Option<String>,
    shadow: Option<String>,
    rollback: bool,
) -> drift_shield::core::errors::Result<()> {
    if let Some(version) = active {
        if let Some(current) = read_pointer(&cfg.paths.active_ptr, 3, PointerKind::Active)? {
            write_pointer(&cfg.paths.rollback_ptr, &current, PointerKind::Rollback)?;
        }
        write_pointer(&cfg.paths.active_ptr, &version, PointerKind::Active)?;
        println!("active -> {version}");
    } else if let Some(version) = shadow {
        write_pointer(&cfg.paths.shadow_ptr, &version, PointerKind::Shadow)?;
        println!("shadow -> {version}");
    } else if rollback {
        let Some(version) = read_pointer(&cfg.paths.rollback_ptr, 3, PointerKind::Rollback)? else {
            eprintln!("dsctl: no rollback version recorded");
            std::process::exit(1);
        };
        write_pointer(&cfg.paths.active_ptr, &version, PointerKind::Active)?;
        println!("active -> {version} (rollback)");
    } else {
        eprintln!("dsctl: promote requires one of --active, --shadow, --rollback");
        std::process::exit(1);
    }
    Ok(())
}

fn retrain_now(cfg: &Config) -> drift_shield::core::errors::Result<()> {
    let emitter = RetrainEmitter::new(
        cfg.paths.requests_dir.clone(),
        cfg.retrain.cooldown_seconds,
        cfg.retrain.max_pending,
    );
    let active_version = read_pointer(&cfg.paths.active_ptr, 3, PointerKind::Active)?.unwrap_or_default();
    let request = RetrainRequest {
        created_at_unix: 0,
        created_at: String::new(),
        reason: "MANUAL_RETRAIN".to_string(),
        drift_score: 0.0,
        model_version: active_version,
        action_code: "MANUAL".to_string(),
        drift: std::collections::BTreeMap::new(),
        p_fraud: None,
        request_id: None,
        extra: None,
    };
    if emitter.emit(request)? {
        println!("retrain request queued");
    } else {
        println!("retrain request refused (cooldown or backlog at capacity)");
    }
    Ok(())
}
