//! Retrain worker: polls the durable request queue, trains a candidate
//! bundle, evaluates it against the active bundle, and promotes or shelves
//! it via the pointer files.
//!
//! The training/evaluation path concretely uses `GbmClassifier` (the `xgb`
//! feature's classifier) — the same backend the serving path fixes
//! `ModelBundle`'s generic classifier parameter to.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DsError, Result};
use crate::core::paths::write_atomic;

const REQUEST_PREFIX: &str = "retrain_request_";
const REQUEST_SUFFIX: &str = ".json";

#[derive(Debug, Serialize, Deserialize)]
struct TimestampMarker {
    ts: f64,
}

/// List pending request files, sorted lexicographically ascending so the
/// smallest (oldest, by the filename's embedded timestamp) sorts first.
pub fn list_pending(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| DsError::io(dir, e))? {
        let entry = entry.map_err(|e| DsError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(REQUEST_PREFIX) && name.ends_with(REQUEST_SUFFIX) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Seconds elapsed since the `ts` stamped in a marker JSON file, or `None`
/// if the marker doesn't exist yet.
pub fn seconds_since(marker: &Path) -> Result<Option<f64>> {
    if !marker.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(marker).map_err(|e| DsError::io(marker, e))?;
    let parsed: TimestampMarker = serde_json::from_str(&raw)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    Ok(Some((now - parsed.ts).max(0.0)))
}

/// Stamp a marker file with the current unix timestamp (atomic write).
pub fn write_timestamp(marker: &Path) -> Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    let bytes = serde_json::to_vec(&TimestampMarker { ts: now })?;
    write_atomic(marker, &bytes)
}

/// Move a processed/failed request file into its destination directory,
/// creating the directory if needed. Best-effort: a rename failure here
/// must not crash the worker loop, only get logged by the caller.
pub fn archive_request(path: &Path, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir).map_err(|e| DsError::io(dest_dir, e))?;
    let Some(name) = path.file_name() else {
        return Ok(());
    };
    fs::rename(path, dest_dir.join(name)).map_err(|e| DsError::io(path, e))
}

fn pick_eval_path(data_dir: &Path) -> PathBuf {
    data_dir.join("test.csv")
}

/// Outcome of one worker poll iteration, surfaced for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    Idle,
    CooldownActive,
    Promoted { version: String },
    Shelved { version: String, reason: String },
    Failed { request_file: String, details: String },
}

#[cfg(feature = "xgb")]
mod pipeline {
    use super::{
        archive_request, list_pending, pick_eval_path, seconds_since, write_timestamp,
        WorkerOutcome,
    };
    use serde::{Deserialize, Serialize};

    use crate::conformal::calib::ConformalCalib;
    use crate::core::config::Config;
    use crate::core::errors::Result;
    use crate::core::paths::write_atomic;
    use crate::model::calibrator::IsotonicCalibrator;
    use crate::model::classifier::GbmClassifier;
    use crate::registry::pointers::{read_pointer, write_pointer, PointerKind};
    use crate::retrain::dataset::{build_retrain_dataset, load_csv, seeded_shuffle_indices};
    use crate::retrain::evaluate::{
        evaluate, passes_promotion_gate, read_baseline_cost, write_risk_coverage, write_summary,
        CostWeights, EvalReport,
    };
    use crate::retrain::train::{new_version_id, train_and_save};
    use std::path::Path;

    #[derive(Debug, Serialize, Deserialize, Clone, Copy)]
    struct EvalReportDto {
        n: usize,
        abstain_rate: f64,
        selective_accuracy: f64,
        avg_cost_per_txn: f64,
    }

    impl From<EvalReport> for EvalReportDto {
        fn from(r: EvalReport) -> Self {
            Self {
                n: r.n,
                abstain_rate: r.abstain_rate,
                selective_accuracy: r.selective_accuracy,
                avg_cost_per_txn: r.avg_cost_per_txn,
            }
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct CandidateReport {
        version: String,
        candidate: EvalReportDto,
        baseline: EvalReportDto,
        promoted: bool,
        rejection_reason: Option<String>,
    }

    /// Consumes the durable request queue and drives one retrain cycle.
    pub struct RetrainWorker {
        cfg: Config,
    }

    impl RetrainWorker {
        #[must_use]
        pub const fn new(cfg: Config) -> Self {
            Self { cfg }
        }

        /// Run one poll iteration: idle/cooldown check, then (if a request
        /// is due) train, evaluate, and gate-promote a candidate.
        pub fn run_once(&self) -> Result<WorkerOutcome> {
            let pending = list_pending(&self.cfg.paths.requests_dir)?;
            let Some((chosen, duplicates)) = pending.split_first() else {
                return Ok(WorkerOutcome::Idle);
            };

            let last_retrain_path = self.cfg.paths.reports_dir.join("last_retrain.json");
            if let Some(elapsed) = seconds_since(&last_retrain_path)? {
                if elapsed < self.cfg.retrain.cooldown_seconds {
                    return Ok(WorkerOutcome::CooldownActive);
                }
            }

            for dup in duplicates {
                let _ = archive_request(dup, &self.cfg.paths.processed_dir);
            }

            match self.process_request() {
                Ok(outcome) => {
                    archive_request(chosen, &self.cfg.paths.processed_dir)?;
                    write_timestamp(&last_retrain_path)?;
                    Ok(outcome)
                }
                Err(e) => {
                    let _ = archive_request(chosen, &self.cfg.paths.failed_dir);
                    Ok(WorkerOutcome::Failed {
                        request_file: chosen.display().to_string(),
                        details: e.to_string(),
                    })
                }
            }
        }

        fn process_request(&self) -> Result<WorkerOutcome> {
            let dataset = build_retrain_dataset(
                &self.cfg.paths.data_dir,
                self.cfg.retrain.old_data_ratio,
                self.cfg.retrain.random_seed,
            )?;
            let version = new_version_id();
            train_and_save::<GbmClassifier>(
                &dataset,
                &self.cfg.paths.versions_dir,
                &version,
                self.cfg.conformal.alpha,
                self.cfg.drift.psi_bins,
                self.cfg.retrain.random_seed,
            )?;

            let eval_split = load_csv(&pick_eval_path(&self.cfg.paths.data_dir))?;
            let sample_size = self.cfg.eval.sample_size.min(eval_split.rows.len());
            // A seeded shuffle-then-take, not a fixed prefix, so the sample
            // isn't biased by whatever order the rows happen to sit in on disk.
            let sample_order = seeded_shuffle_indices(eval_split.rows.len(), self.cfg.retrain.random_seed);
            let sample_indices = &sample_order[..sample_size];
            let sample_rows: Vec<Vec<f64>> = sample_indices.iter().map(|&i| eval_split.rows[i].clone()).collect();
            let sample_labels: Vec<u8> = sample_indices
                .iter()
                .map(|&i| eval_split.labels[i] as u8)
                .collect();
            let full_labels: Vec<u8> = eval_split.labels.iter().map(|&l| l as u8).collect();

            let weights = CostWeights {
                fp_cost: self.cfg.promote.fp_cost,
                fn_cost: self.cfg.promote.fn_cost,
                abstain_cost: self.cfg.promote.abstain_cost,
            };

            let candidate_dir = self.cfg.paths.versions_dir.join(&version);
            let candidate_report = evaluate_bundle(
                &candidate_dir,
                &sample_rows,
                &sample_labels,
                weights,
            )?;

            let active_version = read_pointer(&self.cfg.paths.active_ptr, 3, PointerKind::Active)?;
            let baseline_report = match active_version.as_ref() {
                Some(v) => evaluate_bundle(
                    &self.cfg.paths.versions_dir.join(v),
                    &sample_rows,
                    &sample_labels,
                    weights,
                )?,
                None => candidate_report,
            };

            write_pointer(&self.cfg.paths.shadow_ptr, &version, PointerKind::Shadow)?;

            // `reports/summary.json`, when one has already been persisted, is
            // the baseline cost the gate compares against; a freshly
            // recomputed active-model cost only covers the first-ever cycle.
            let baseline_cost =
                read_baseline_cost(&self.cfg.paths.reports_dir).unwrap_or(baseline_report.avg_cost_per_txn);

            let last_promotion_path = self.cfg.paths.reports_dir.join("last_promotion.json");
            let since_promotion = seconds_since(&last_promotion_path)?;
            let gate_passes = passes_promotion_gate(
                &candidate_report,
                baseline_cost,
                self.cfg.promote.max_cost_increase,
                since_promotion,
                self.cfg.promote.cooldown_seconds,
            );

            let (promoted, rejection_reason) = if gate_passes && self.cfg.promote.auto_promote {
                if let Some(active) = active_version {
                    write_pointer(&self.cfg.paths.rollback_ptr, &active, PointerKind::Rollback)?;
                }
                write_pointer(&self.cfg.paths.active_ptr, &version, PointerKind::Active)?;
                write_timestamp(&last_promotion_path)?;

                let full_report = evaluate_bundle(&candidate_dir, &eval_split.rows, &full_labels, weights)?;
                write_summary(
                    &self.cfg.paths.reports_dir,
                    &full_report,
                    weights,
                    1.0 - self.cfg.conformal.alpha,
                )?;
                let classifier = GbmClassifier::load(&candidate_dir.join("xgb_model.json"))?;
                let calibrator = IsotonicCalibrator::load(&candidate_dir.join("proba_calibrator.json"))?;
                write_risk_coverage(
                    &self.cfg.paths.reports_dir,
                    &classifier,
                    &calibrator,
                    &eval_split.rows,
                    &full_labels,
                )?;

                (true, None)
            } else if gate_passes {
                (false, Some("AUTO_PROMOTE_DISABLED".to_string()))
            } else {
                (false, Some("COST_REGRESSION_OR_COOLDOWN".to_string()))
            };

            let report = CandidateReport {
                version: version.clone(),
                candidate: candidate_report.into(),
                baseline: baseline_report.into(),
                promoted,
                rejection_reason: rejection_reason.clone(),
            };
            let report_path = self
                .cfg
                .paths
                .reports_dir
                .join(format!("retrain_candidate_{version}.json"));
            write_atomic(&report_path, &serde_json::to_vec_pretty(&report)?)?;

            if promoted {
                Ok(WorkerOutcome::Promoted { version })
            } else {
                Ok(WorkerOutcome::Shelved {
                    version,
                    reason: rejection_reason.unwrap_or_default(),
                })
            }
        }
    }

    fn evaluate_bundle(
        dir: &Path,
        rows: &[Vec<f64>],
        labels: &[u8],
        weights: CostWeights,
    ) -> Result<EvalReport> {
        let classifier = GbmClassifier::load(&dir.join("xgb_model.json"))?;
        let calibrator = IsotonicCalibrator::load(&dir.join("proba_calibrator.json"))?;
        let calib = ConformalCalib::load(&dir.join("calib_meta.json"))?;
        Ok(evaluate(&classifier, &calibrator, &calib, rows, labels, weights))
    }
}

#[cfg(feature = "xgb")]
pub use pipeline::RetrainWorker;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_pending_sorts_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("retrain_request_20260101_000200.json"), b"{}").unwrap();
        fs::write(dir.path().join("retrain_request_20260101_000100.json"), b"{}").unwrap();
        let files = list_pending(dir.path()).unwrap();
        assert!(files[0].to_string_lossy().contains("000100"));
        assert!(files[1].to_string_lossy().contains("000200"));
    }

    #[test]
    fn list_pending_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        assert!(list_pending(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn seconds_since_missing_marker_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(seconds_since(&dir.path().join("last_retrain.json")).unwrap().is_none());
    }

    #[test]
    fn write_timestamp_then_seconds_since_is_near_zero() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("last_retrain.json");
        write_timestamp(&marker).unwrap();
        let elapsed = seconds_since(&marker).unwrap().unwrap();
        assert!(elapsed < 1.0);
    }

    #[test]
    fn archive_request_moves_file_into_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("retrain_request_1.json");
        fs::write(&src, b"{}").unwrap();
        let dest_dir = dir.path().join("processed");
        archive_request(&src, &dest_dir).unwrap();
        assert!(dest_dir.join("retrain_request_1.json").exists());
        assert!(!src.exists());
    }
}
