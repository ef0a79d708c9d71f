//! Streaming PSI + Kolmogorov-Smirnov drift detection over a sliding window.

pub mod detector;
pub mod ks;
pub mod psi;
pub mod reference;

pub use detector::{DriftDetector, DriftResult};
pub use reference::DriftReference;
