//! Shared path manipulation utilities.

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::core::errors::{DsError, Result};

/// Write `bytes` to `path` atomically: write to a sibling `.tmp` file,
/// `sync_all`, then `rename` over the destination. Cleans up the temp
/// file if anything fails before the rename.
///
/// This is the only way pointer files and retrain-request files are ever
/// written: a reader can never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    let result = (|| -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DsError::io(parent.to_path_buf(), e))?;
        }
        let mut file = File::create(&tmp_path).map_err(|e| DsError::io(tmp_path.clone(), e))?;
        file.write_all(bytes)
            .map_err(|e| DsError::io(tmp_path.clone(), e))?;
        file.sync_all().map_err(|e| DsError::io(tmp_path.clone(), e))?;
        fs::rename(&tmp_path, path).map_err(|e| DsError::io(path.to_path_buf(), e))?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    // Try filesystem resolution first (handles symlinks).
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    // Fallback: syntactic normalization.
    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
