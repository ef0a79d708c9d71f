//! Split-conformal prediction for the binary fraud classifier.

pub mod calib;

pub use calib::{ConformalCalib, prediction_set};
