//! Out-of-process retraining: durable request emission, dataset assembly,
//! candidate training, cost-based evaluation, and the polling worker that
//! ties them together.

pub mod dataset;
pub mod emitter;
pub mod evaluate;
pub mod train;
pub mod worker;

pub use emitter::{RetrainEmitter, RetrainRequest};
#[cfg(feature = "xgb")]
pub use worker::RetrainWorker;
pub use worker::WorkerOutcome;
