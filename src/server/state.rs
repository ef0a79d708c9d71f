//! Shared application state handed to every axum handler.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::core::config::Config;
use crate::logger::jsonl::JsonlWriter;
use crate::model::classifier::GbmClassifier;
use crate::registry::BundleManager;
use crate::retrain::RetrainEmitter;

#[cfg(feature = "sqlite")]
use crate::logger::sqlite::SqliteLogger;

/// Everything a request handler needs: the model registry, the durable
/// retrain queue, resolved config, and the event loggers.
///
/// `BundleManager` is generic over its classifier backend; the serving
/// binary fixes it to `GbmClassifier` here, the only point in the stack
/// that names a concrete backend.
pub struct AppState {
    pub manager: Arc<BundleManager<GbmClassifier>>,
    pub emitter: Arc<RetrainEmitter>,
    pub config: Config,
    pub jsonl: Mutex<JsonlWriter>,
    #[cfg(feature = "sqlite")]
    pub sqlite: Option<SqliteLogger>,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(
        manager: Arc<BundleManager<GbmClassifier>>,
        emitter: Arc<RetrainEmitter>,
        config: Config,
        jsonl: JsonlWriter,
        #[cfg(feature = "sqlite")] sqlite: Option<SqliteLogger>,
    ) -> Self {
        Self {
            manager,
            emitter,
            config,
            jsonl: Mutex::new(jsonl),
            #[cfg(feature = "sqlite")]
            sqlite,
            started_at: Instant::now(),
        }
    }
}
