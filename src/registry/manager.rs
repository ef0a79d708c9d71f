//! Dual active/shadow model registry with atomic pointer-driven hot-swap.
//!
//! A pointer read that's missing, corrupt, or names a version whose bundle
//! fails to load never tears down an already-serving bundle: the manager
//! keeps serving the last good version and surfaces the failure only as a
//! log line, per the "never serve a broken state" invariant.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::errors::{DsError, Result};
use crate::model::bundle::{DriftTuning, ModelBundle};
use crate::model::classifier::ProbabilisticClassifier;
use crate::registry::pointers::{read_pointer, PointerKind};

const POINTER_READ_RETRIES: u32 = 3;

struct Cached<C: ProbabilisticClassifier> {
    version: String,
    bundle: Arc<ModelBundle<C>>,
}

/// Holds the currently-served active and shadow bundles, refreshing them
/// from pointer files on demand. Generic over the classifier backend `C` —
/// the manager never hardcodes one, it just reloads whatever `ModelBundle<C>`
/// names.
pub struct BundleManager<C: ProbabilisticClassifier> {
    versions_dir: PathBuf,
    active_ptr: PathBuf,
    shadow_ptr: PathBuf,
    tuning: DriftTuning,
    required_hard_windows: u32,
    active: Mutex<Option<Cached<C>>>,
    shadow: Mutex<Option<Cached<C>>>,
}

impl<C: ProbabilisticClassifier> BundleManager<C> {
    #[must_use]
    pub fn new(
        versions_dir: PathBuf,
        active_ptr: PathBuf,
        shadow_ptr: PathBuf,
        tuning: DriftTuning,
        required_hard_windows: u32,
    ) -> Self {
        Self {
            versions_dir,
            active_ptr,
            shadow_ptr,
            tuning,
            required_hard_windows,
            active: Mutex::new(None),
            shadow: Mutex::new(None),
        }
    }

    /// Resolve the currently active bundle. If the pointer is unreadable or
    /// names a version that fails to load, falls back to the previously
    /// cached bundle. Only errors if there is no previous bundle to fall
    /// back to — the service must never serve with nothing loaded.
    pub fn get_active(&self) -> Result<Arc<ModelBundle<C>>> {
        self.resolve(&self.active_ptr, &self.active, PointerKind::Active, true)
            .and_then(|opt| opt.ok_or(DsError::NoActiveBundle))
    }

    /// Resolve the currently shadow bundle, if any. Missing pointer or a
    /// failed load with no previous shadow bundle returns `None` rather
    /// than an error: shadow traffic is best-effort.
    pub fn get_shadow(&self) -> Option<Arc<ModelBundle<C>>> {
        self.resolve(&self.shadow_ptr, &self.shadow, PointerKind::Shadow, false)
            .ok()
            .flatten()
    }

    /// Version string currently cached for active/shadow, without
    /// triggering a pointer re-read. `None` if nothing has been loaded yet.
    #[must_use]
    pub fn active_version(&self) -> Option<String> {
        self.active.lock().as_ref().map(|c| c.version.clone())
    }

    #[must_use]
    pub fn shadow_version(&self) -> Option<String> {
        self.shadow.lock().as_ref().map(|c| c.version.clone())
    }

    fn resolve(
        &self,
        ptr_path: &PathBuf,
        slot: &Mutex<Option<Cached<C>>>,
        kind: PointerKind,
        required: bool,
    ) -> Result<Option<Arc<ModelBundle<C>>>> {
        let pointer_result = read_pointer(ptr_path, POINTER_READ_RETRIES, kind);
        let version = match pointer_result {
            Ok(Some(v)) => v,
            Ok(None) => {
                return Ok(slot.lock().as_ref().map(|c| c.bundle.clone()));
            }
            Err(e) => {
                eprintln!("[DS-REGISTRY] pointer read failed for {ptr_path:?}: {e}");
                let cached = slot.lock().as_ref().map(|c| c.bundle.clone());
                if cached.is_none() && required {
                    return Err(e);
                }
                return Ok(cached);
            }
        };

        {
            let guard = slot.lock();
            if let Some(cached) = guard.as_ref() {
                if cached.version == version {
                    return Ok(Some(cached.bundle.clone()));
                }
            }
        }

        match ModelBundle::load(
            &self.versions_dir,
            &version,
            self.tuning,
            self.required_hard_windows,
        ) {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                *slot.lock() = Some(Cached {
                    version,
                    bundle: bundle.clone(),
                });
                Ok(Some(bundle))
            }
            Err(e) => {
                eprintln!("[DS-REGISTRY] failed to load version {version}: {e}");
                let cached = slot.lock().as_ref().map(|c| c.bundle.clone());
                if cached.is_none() && required {
                    return Err(e);
                }
                Ok(cached)
            }
        }
    }
}
