//! Model bundle contents: classifier capability, probability calibration.

pub mod bundle;
pub mod calibrator;
pub mod classifier;

pub use bundle::{DriftTuning, ModelBundle};
