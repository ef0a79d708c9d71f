//! Classifier capability boundary: the decision pipeline only ever needs a
//! black box that maps a feature row to a raw `[p0, p1]` probability pair.
//! Training math is delegated to whatever implements this trait; this crate
//! ships one conforming implementation backed by gradient-boosted trees.

use std::path::Path;

use crate::core::errors::Result;

/// A pluggable probabilistic binary classifier.
pub trait ProbabilisticClassifier: Sized {
    /// Fit a new classifier from dense feature rows and binary labels.
    fn fit(rows: &[Vec<f64>], labels: &[u8]) -> Result<Self>;

    /// Raw (uncalibrated) class probabilities `[p0, p1]` for one row.
    fn raw_proba(&self, row: &[f64]) -> [f64; 2];

    /// Persist the fitted model under `path`.
    fn save(&self, path: &Path) -> Result<()>;

    /// Load a previously saved model from `path`.
    fn load(path: &Path) -> Result<Self>;
}

#[cfg(feature = "xgb")]
pub use xgb::GbmClassifier;

#[cfg(feature = "xgb")]
mod xgb {
    use std::path::Path;

    use xgboost::parameters::{self, learning, tree};
    use xgboost::{Booster, DMatrix};

    use super::ProbabilisticClassifier;
    use crate::core::errors::{DsError, Result};

    /// Gradient-boosted tree classifier, backed by the `xgboost` crate.
    /// Artifacts round-trip through XGBoost's own JSON model dump format
    /// (`xgb_model.json`), so the on-disk contract is whatever a
    /// conforming boosting library documents, not a format this crate owns.
    pub struct GbmClassifier {
        booster: Booster,
    }

    impl ProbabilisticClassifier for GbmClassifier {
        fn fit(rows: &[Vec<f64>], labels: &[u8]) -> Result<Self> {
            let n_rows = rows.len();
            let n_cols = rows.first().map_or(0, Vec::len);
            let flat: Vec<f32> = rows.iter().flatten().map(|&v| v as f32).collect();
            let y: Vec<f32> = labels.iter().map(|&v| f32::from(v)).collect();

            let n_pos = labels.iter().filter(|&&l| l == 1).count().max(1) as f32;
            let n_neg = labels.iter().filter(|&&l| l == 0).count().max(1) as f32;
            let scale_pos_weight = n_neg / n_pos;

            let mut dtrain = DMatrix::from_dense(&flat, n_rows)
                .map_err(|e| DsError::Worker { details: e.to_string() })?;
            dtrain
                .set_labels(&y)
                .map_err(|e| DsError::Worker { details: e.to_string() })?;
            let _ = n_cols;

            let learning_params = learning::LearningTaskParametersBuilder::default()
                .objective(learning::Objective::BinaryLogistic)
                .build()
                .map_err(|e| DsError::Worker { details: e.to_string() })?;
            let tree_params = tree::TreeBoosterParametersBuilder::default()
                .max_depth(6)
                .eta(0.1)
                .scale_pos_weight(scale_pos_weight)
                .build()
                .map_err(|e| DsError::Worker { details: e.to_string() })?;
            let booster_params = parameters::BoosterParametersBuilder::default()
                .learning_params(learning_params)
                .tree_params(tree_params)
                .build()
                .map_err(|e| DsError::Worker { details: e.to_string() })?;
            let params = parameters::TrainingParametersBuilder::default()
                .dtrain(&dtrain)
                .boost_rounds(200)
                .booster_params(booster_params)
                .build()
                .map_err(|e| DsError::Worker { details: e.to_string() })?;

            let booster =
                Booster::train(&params).map_err(|e| DsError::Worker { details: e.to_string() })?;
            Ok(Self { booster })
        }

        fn raw_proba(&self, row: &[f64]) -> [f64; 2] {
            let flat: Vec<f32> = row.iter().map(|&v| v as f32).collect();
            let Ok(dmat) = DMatrix::from_dense(&flat, 1) else {
                return [0.5, 0.5];
            };
            let Ok(preds) = self.booster.predict(&dmat) else {
                return [0.5, 0.5];
            };
            let p1 = f64::from(preds.first().copied().unwrap_or(0.5));
            [1.0 - p1, p1]
        }

        fn save(&self, path: &Path) -> Result<()> {
            self.booster
                .save(path)
                .map_err(|e| DsError::Worker { details: e.to_string() })
        }

        fn load(path: &Path) -> Result<Self> {
            let booster =
                Booster::load(path).map_err(|e| DsError::Worker { details: e.to_string() })?;
            Ok(Self { booster })
        }
    }
}

#[cfg(all(test, feature = "xgb"))]
mod tests {
    use super::*;

    #[test]
    fn fit_and_predict_round_trip() {
        let rows: Vec<Vec<f64>> = (0..200)
            .map(|i| vec![f64::from(i % 20), f64::from((i * 3) % 17)])
            .collect();
        let labels: Vec<u8> = (0..200).map(|i| u8::from(i % 20 > 15)).collect();
        let model = GbmClassifier::fit(&rows, &labels).unwrap();
        let proba = model.raw_proba(&[19.0, 1.0]);
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-6);
    }
}
