//! Pointer files: small JSON documents naming which model version is
//! currently active/shadow/rollback. Written atomically; read with retries
//! since a reader can race a writer's rename.

use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use crate::core::errors::{DsError, Result};
use crate::core::paths::write_atomic;

const READ_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Which pointer file is being read/written — each carries its own JSON key
/// name, matching `ACTIVE_MODEL.json {active_version}`,
/// `SHADOW_MODEL.json {shadow_version}`, `ROLLBACK_MODEL.json
/// {rollback_version}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Active,
    Shadow,
    Rollback,
}

impl PointerKind {
    const fn key(self) -> &'static str {
        match self {
            Self::Active => "active_version",
            Self::Shadow => "shadow_version",
            Self::Rollback => "rollback_version",
        }
    }
}

/// Read a pointer file's version key, retrying up to `retries` times on
/// transient IO/parse errors (the writer's rename can race a reader).
/// Returns `Ok(None)` if the file genuinely does not exist; never blocks
/// longer than `retries * 20ms`.
pub fn read_pointer(path: &Path, retries: u32, kind: PointerKind) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut last_err = None;
    for attempt in 0..=retries {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&raw) {
                Ok(doc) => {
                    let version = doc
                        .get(kind.key())
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    if version.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(version));
                }
                Err(e) => last_err = Some(e.to_string()),
            },
            Err(e) => last_err = Some(e.to_string()),
        }
        if attempt < retries {
            sleep(READ_RETRY_DELAY);
        }
    }
    Err(DsError::PointerUnreadable {
        path: path.to_path_buf(),
        attempts: retries + 1,
        details: last_err.unwrap_or_default(),
    })
}

/// Write a pointer file atomically, `{<kind's key>: version}` — the exact
/// single-key shape `registry.py`'s `_write_pointer` produces.
pub fn write_pointer(path: &Path, version: &str, kind: PointerKind) -> Result<()> {
    let mut doc = serde_json::Map::new();
    doc.insert(kind.key().to_string(), serde_json::Value::from(version));
    let bytes = serde_json::to_vec_pretty(&doc)?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pointer_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ACTIVE_MODEL.json");
        assert!(read_pointer(&path, 3, PointerKind::Active).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ACTIVE_MODEL.json");
        write_pointer(&path, "v_20260101T000000Z", PointerKind::Active).unwrap();
        let version = read_pointer(&path, 3, PointerKind::Active).unwrap();
        assert_eq!(version.as_deref(), Some("v_20260101T000000Z"));
    }

    #[test]
    fn distinct_kinds_use_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SHADOW_MODEL.json");
        write_pointer(&path, "v2", PointerKind::Shadow).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("shadow_version"));
        assert!(read_pointer(&path, 0, PointerKind::Active).unwrap().is_none());
        assert_eq!(
            read_pointer(&path, 0, PointerKind::Shadow).unwrap().as_deref(),
            Some("v2")
        );
    }

    #[test]
    fn corrupt_pointer_errors_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ACTIVE_MODEL.json");
        fs::write(&path, b"not json").unwrap();
        let err = read_pointer(&path, 1, PointerKind::Active).unwrap_err();
        assert_eq!(err.code(), "DS-3003");
    }

    #[test]
    fn blank_version_is_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ACTIVE_MODEL.json");
        fs::write(&path, br#"{"active_version":"  "}"#).unwrap();
        assert!(read_pointer(&path, 0, PointerKind::Active).unwrap().is_none());
    }
}
