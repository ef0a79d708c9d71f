//! Retrain dataset assembly: blend a seeded sample of the original training
//! pool with all available drifted rows, shuffle, and split 85/15 into a
//! fresh train/calibration pair for the candidate pipeline.

use std::path::{Path, PathBuf};

use crate::core::errors::{DsError, Result};

const LABEL_COLUMN: &str = "label";
const TRAIN_CALIB_SPLIT: f64 = 0.85;

/// A loaded CSV split: feature columns in file order plus the `label` column.
#[derive(Debug, Clone)]
pub struct CsvSplit {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl CsvSplit {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn concat(mut self, mut other: Self) -> Self {
        self.rows.append(&mut other.rows);
        self.labels.append(&mut other.labels);
        self
    }
}

/// The 85/15 split handed to the training pipeline.
#[derive(Debug, Clone)]
pub struct RetrainDataset {
    pub feature_names: Vec<String>,
    pub train: CsvSplit,
    pub calib: CsvSplit,
}

/// Load one CSV split. Every non-`label` column is treated as a feature in
/// header order; the `label` column must be present and parse as `0.0`/`1.0`.
pub fn load_csv(path: &Path) -> Result<CsvSplit> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_err(path))?;
    let headers = reader.headers().map_err(csv_err(path))?.clone();
    let label_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(LABEL_COLUMN))
        .ok_or_else(|| DsError::ArtifactCorrupt {
            path: path.to_path_buf(),
            details: format!("missing `{LABEL_COLUMN}` column"),
        })?;
    let feature_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != label_idx)
        .map(|(_, h)| h.to_string())
        .collect();

    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err(path))?;
        let mut row = Vec::with_capacity(feature_names.len());
        for (i, field) in record.iter().enumerate() {
            if i == label_idx {
                continue;
            }
            let value: f64 = field.parse().map_err(|_| DsError::ArtifactCorrupt {
                path: path.to_path_buf(),
                details: format!("non-numeric feature value {field:?}"),
            })?;
            row.push(value);
        }
        let label: f64 = record
            .get(label_idx)
            .unwrap_or("")
            .parse()
            .map_err(|_| DsError::ArtifactCorrupt {
                path: path.to_path_buf(),
                details: "non-numeric label value".to_string(),
            })?;
        rows.push(row);
        labels.push(label);
    }

    Ok(CsvSplit {
        feature_names,
        rows,
        labels,
    })
}

/// Build the candidate training dataset for one retrain cycle.
///
/// Loads `train.csv` + `calib.csv` as the original pool, `test_drifted.csv`
/// if present (else `test.csv`) as the drifted sample, blends `old_data_ratio`
/// of a seeded sample of the original pool with all drifted rows, shuffles
/// with `seed`, then splits 85/15 into train/calibration.
pub fn build_retrain_dataset(
    data_dir: &Path,
    old_data_ratio: f64,
    seed: u64,
) -> Result<RetrainDataset> {
    let original = load_csv(&data_dir.join("train.csv"))?.concat(load_csv(&data_dir.join("calib.csv"))?);
    let drifted_path = pick_drifted_path(data_dir);
    let drifted = load_csv(&drifted_path)?;

    let old_sample_size = (original.len() as f64 * old_data_ratio).round() as usize;
    let old_indices = seeded_shuffle_indices(original.len(), seed);
    let old_indices = &old_indices[..old_sample_size.min(original.len())];

    let feature_names = original.feature_names.clone();
    let mut rows: Vec<Vec<f64>> = old_indices.iter().map(|&i| original.rows[i].clone()).collect();
    let mut labels: Vec<f64> = old_indices.iter().map(|&i| original.labels[i]).collect();
    rows.extend(drifted.rows.iter().cloned());
    labels.extend(drifted.labels.iter().copied());

    let order = seeded_shuffle_indices(rows.len(), seed.wrapping_add(1));
    let rows: Vec<Vec<f64>> = order.iter().map(|&i| rows[i].clone()).collect();
    let labels: Vec<f64> = order.iter().map(|&i| labels[i]).collect();

    let split_at = ((rows.len() as f64) * TRAIN_CALIB_SPLIT).round() as usize;
    let (train_rows, calib_rows) = rows.split_at(split_at.min(rows.len()));
    let (train_labels, calib_labels) = labels.split_at(split_at.min(labels.len()));

    Ok(RetrainDataset {
        feature_names: feature_names.clone(),
        train: CsvSplit {
            feature_names: feature_names.clone(),
            rows: train_rows.to_vec(),
            labels: train_labels.to_vec(),
        },
        calib: CsvSplit {
            feature_names,
            rows: calib_rows.to_vec(),
            labels: calib_labels.to_vec(),
        },
    })
}

fn pick_drifted_path(data_dir: &Path) -> PathBuf {
    let drifted = data_dir.join("test_drifted.csv");
    if drifted.exists() {
        drifted
    } else {
        data_dir.join("test.csv")
    }
}

pub(crate) fn seeded_shuffle_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut state = seed.max(1);
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    for i in (1..indices.len()).rev() {
        let j = (next() as usize) % (i + 1);
        indices.swap(i, j);
    }
    indices
}

fn csv_err(path: &Path) -> impl Fn(csv::Error) -> DsError + '_ {
    move |e| DsError::ArtifactCorrupt {
        path: path.to_path_buf(),
        details: e.to_string(),
    }
}
