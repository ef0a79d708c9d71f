//! SQLite logger: WAL-mode database for structured decision/retrain history.
//!
//! Uses Write-Ahead Logging for concurrent read/write and prepared statements
//! for insert throughput. Feeds `GET /dashboard/stats` aggregation.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params};

use crate::core::errors::{DsError, Result};

/// A single served-prediction row.
#[derive(Debug, Clone)]
pub struct DecisionRow {
    pub timestamp: String,
    pub model_version: String,
    pub action_code: String,
    pub drift_score: f64,
    pub p_fraud: Option<f64>,
    pub latency_ms: f64,
    pub shadow_disagree: bool,
}

/// A single retrain-candidate evaluation row.
#[derive(Debug, Clone)]
pub struct RetrainRow {
    pub timestamp: String,
    pub candidate_version: String,
    pub avg_cost_per_txn: f64,
    pub abstain_rate: f64,
    pub promoted: bool,
    pub rejection_reason: Option<String>,
}

/// Historical-stats logger with WAL mode.
pub struct SqliteLogger {
    conn: Connection,
    path: PathBuf,
}

impl SqliteLogger {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a served-prediction row.
    pub fn log_decision(&self, row: &DecisionRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO decisions (
                    timestamp, model_version, action_code, drift_score,
                    p_fraud, latency_ms, shadow_disagree
                ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            )?
            .execute(params![
                row.timestamp,
                row.model_version,
                row.action_code,
                row.drift_score,
                row.p_fraud,
                row.latency_ms,
                row.shadow_disagree,
            ])?;
        Ok(())
    }

    /// Insert a retrain-candidate evaluation row.
    pub fn log_retrain(&self, row: &RetrainRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO retrains (
                    timestamp, candidate_version, avg_cost_per_txn,
                    abstain_rate, promoted, rejection_reason
                ) VALUES (?1,?2,?3,?4,?5,?6)",
            )?
            .execute(params![
                row.timestamp,
                row.candidate_version,
                row.avg_cost_per_txn,
                row.abstain_rate,
                row.promoted,
                row.rejection_reason,
            ])?;
        Ok(())
    }

    /// Count decisions and mean drift score over the last `n` rows.
    pub fn recent_decision_summary(&self, n: u32) -> Result<(u64, f64)> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT COUNT(*), COALESCE(AVG(drift_score), 0.0) FROM (
                SELECT drift_score FROM decisions ORDER BY id DESC LIMIT ?1
            )",
        )?;
        let row = stmt.query_row(params![n], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?)))?;
        Ok((row.0 as u64, row.1))
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            model_version TEXT NOT NULL,
            action_code TEXT NOT NULL,
            drift_score REAL NOT NULL,
            p_fraud REAL,
            latency_ms REAL NOT NULL,
            shadow_disagree INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_decisions_ts ON decisions(timestamp);

        CREATE TABLE IF NOT EXISTS retrains (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            candidate_version TEXT NOT NULL,
            avg_cost_per_txn REAL NOT NULL,
            abstain_rate REAL NOT NULL,
            promoted INTEGER NOT NULL,
            rejection_reason TEXT
        );",
    )?;
    Ok(())
}
