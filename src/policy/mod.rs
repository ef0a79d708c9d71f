//! Serving policy: request-contract validation, action decision, and the
//! retrain trigger latch.

pub mod decision;
pub mod schema;
pub mod trigger;

pub use decision::{decide_action, ActionCode};
pub use schema::{validate_request, FeatureValue, SchemaViolation};
pub use trigger::{RetrainTrigger, TriggerResult};
