//! Retrain request emitter: a cooldown- and backlog-bounded durable queue.
//!
//! Requests are plain JSON files under `requests_dir`, written via
//! temp-file + atomic rename so the worker never observes a half-written
//! file. A sibling `.last_emit` marker's mtime is the cooldown clock.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{DsError, Result};
use crate::core::paths::write_atomic;

const LAST_EMIT_FILE: &str = ".last_emit";
const REQUEST_GLOB_PREFIX: &str = "retrain_request_";
const REQUEST_GLOB_SUFFIX: &str = ".json";

/// One retrain request payload, matching the on-disk file shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainRequest {
    pub created_at_unix: u64,
    pub created_at: String,
    pub reason: String,
    pub drift_score: f64,
    pub model_version: String,
    pub action_code: String,
    pub drift: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_fraud: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Emits durable retrain request files, gated by cooldown and backlog size.
///
/// The spec notes the cooldown check, backlog check, and file write are not
/// mutually atomic across concurrent callers; a process-local lock removes
/// the race within one process (the worker still tolerates duplicates from
/// multiple processes by dropping all but the lexicographically smallest).
pub struct RetrainEmitter {
    requests_dir: PathBuf,
    cooldown_seconds: f64,
    max_pending: usize,
    guard: Mutex<()>,
}

impl RetrainEmitter {
    #[must_use]
    pub fn new(requests_dir: PathBuf, cooldown_seconds: f64, max_pending: usize) -> Self {
        Self {
            requests_dir,
            cooldown_seconds,
            max_pending,
            guard: Mutex::new(()),
        }
    }

    /// Attempt to emit a retrain request. Returns `true` if a new request
    /// file was written, `false` if refused by cooldown or backlog.
    pub fn emit(&self, mut request: RetrainRequest) -> Result<bool> {
        let _held = self.guard.lock();

        let marker = self.requests_dir.join(LAST_EMIT_FILE);
        if let Some(last) = marker_mtime(&marker)? {
            let elapsed = SystemTime::now()
                .duration_since(last)
                .unwrap_or_default()
                .as_secs_f64();
            if elapsed < self.cooldown_seconds {
                return Ok(false);
            }
        }

        let pending = count_pending(&self.requests_dir)?;
        if pending >= self.max_pending {
            return Ok(false);
        }

        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        request.created_at_unix = now.as_secs();
        request.created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let filename = format!(
            "{REQUEST_GLOB_PREFIX}{}{REQUEST_GLOB_SUFFIX}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.requests_dir.join(filename);
        let bytes = serde_json::to_vec_pretty(&request)?;
        write_atomic(&path, &bytes)?;
        touch(&marker)?;
        Ok(true)
    }
}

fn marker_mtime(marker: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(marker) {
        Ok(meta) => Ok(Some(meta.modified().map_err(|e| DsError::io(marker, e))?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DsError::io(marker, e)),
    }
}

fn touch(marker: &Path) -> Result<()> {
    if let Some(parent) = marker.parent() {
        fs::create_dir_all(parent).map_err(|e| DsError::io(parent, e))?;
    }
    File::create(marker).map_err(|e| DsError::io(marker, e))?;
    Ok(())
}

fn count_pending(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in fs::read_dir(dir).map_err(|e| DsError::io(dir, e))? {
        let entry = entry.map_err(|e| DsError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(REQUEST_GLOB_PREFIX) && name.ends_with(REQUEST_GLOB_SUFFIX) {
            count += 1;
        }
    }
    Ok(count)
}
