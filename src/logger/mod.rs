//! JSONL event logging, plus optional SQLite-backed historical stats.

pub mod jsonl;
#[cfg(feature = "sqlite")]
pub mod sqlite;
