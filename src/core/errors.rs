//! DS-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DsError>;

/// Top-level error type for Drift Shield.
///
/// Codes are grouped by range: `1xxx` config, `2xxx` model/artifact IO,
/// `3xxx` filesystem/queue IO, `4xxx` schema/contract, `5xxx`
/// runtime/prediction.
#[derive(Debug, Error)]
pub enum DsError {
    #[error("[DS-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DS-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DS-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DS-2001] missing bundle artifact {name} under {version_dir}")]
    MissingArtifact {
        version_dir: PathBuf,
        name: &'static str,
    },

    #[error("[DS-2002] bundle artifact corrupt at {path}: {details}")]
    ArtifactCorrupt { path: PathBuf, details: String },

    #[error("[DS-2003] no active model bundle is loaded")]
    NoActiveBundle,

    #[error("[DS-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DS-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[DS-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[DS-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DS-3003] pointer file {path} unreadable after {attempts} attempts: {details}")]
    PointerUnreadable {
        path: PathBuf,
        attempts: u32,
        details: String,
    },

    #[error("[DS-4001] schema mismatch: request version {got} != expected {expected}")]
    SchemaMismatch { got: i64, expected: i64 },

    #[error("[DS-4002] missing features: {names}")]
    MissingFeatures { names: String },

    #[error("[DS-4003] extra features: {names}")]
    ExtraFeatures { names: String },

    #[error("[DS-4004] invalid feature values: {names}")]
    InvalidFeatureValues { names: String },

    #[error("[DS-5001] prediction request throttled: {reason}")]
    Throttled { reason: String },

    #[error("[DS-5002] upstream model service unavailable: {details}")]
    ModelServiceUnavailable { details: String },

    #[error("[DS-5900] worker failure: {details}")]
    Worker { details: String },

    #[error("[DS-5901] runtime failure: {details}")]
    Runtime { details: String },
}

impl DsError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DS-1001",
            Self::MissingConfig { .. } => "DS-1002",
            Self::ConfigParse { .. } => "DS-1003",
            Self::MissingArtifact { .. } => "DS-2001",
            Self::ArtifactCorrupt { .. } => "DS-2002",
            Self::NoActiveBundle => "DS-2003",
            Self::Serialization { .. } => "DS-2101",
            Self::Sql { .. } => "DS-2102",
            Self::PermissionDenied { .. } => "DS-3001",
            Self::Io { .. } => "DS-3002",
            Self::PointerUnreadable { .. } => "DS-3003",
            Self::SchemaMismatch { .. } => "DS-4001",
            Self::MissingFeatures { .. } => "DS-4002",
            Self::ExtraFeatures { .. } => "DS-4003",
            Self::InvalidFeatureValues { .. } => "DS-4004",
            Self::Throttled { .. } => "DS-5001",
            Self::ModelServiceUnavailable { .. } => "DS-5002",
            Self::Worker { .. } => "DS-5900",
            Self::Runtime { .. } => "DS-5901",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::PointerUnreadable { .. }
                | Self::Sql { .. }
                | Self::ModelServiceUnavailable { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the caller should surface this as an HTTP 4xx (request is
    /// malformed / contract-violating) rather than a 5xx.
    #[must_use]
    pub const fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. }
                | Self::MissingFeatures { .. }
                | Self::ExtraFeatures { .. }
                | Self::InvalidFeatureValues { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DsError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DsError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_errors() -> Vec<DsError> {
        vec![
            DsError::InvalidConfig {
                details: String::new(),
            },
            DsError::MissingConfig {
                path: PathBuf::new(),
            },
            DsError::ConfigParse {
                context: "",
                details: String::new(),
            },
            DsError::MissingArtifact {
                version_dir: PathBuf::new(),
                name: "xgb_model.json",
            },
            DsError::ArtifactCorrupt {
                path: PathBuf::new(),
                details: String::new(),
            },
            DsError::NoActiveBundle,
            DsError::Serialization {
                context: "",
                details: String::new(),
            },
            DsError::Sql {
                context: "",
                details: String::new(),
            },
            DsError::PermissionDenied {
                path: PathBuf::new(),
            },
            DsError::Io {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "test"),
            },
            DsError::PointerUnreadable {
                path: PathBuf::new(),
                attempts: 3,
                details: String::new(),
            },
            DsError::SchemaMismatch {
                got: 2,
                expected: 1,
            },
            DsError::MissingFeatures {
                names: String::new(),
            },
            DsError::ExtraFeatures {
                names: String::new(),
            },
            DsError::InvalidFeatureValues {
                names: String::new(),
            },
            DsError::Throttled {
                reason: String::new(),
            },
            DsError::ModelServiceUnavailable {
                details: String::new(),
            },
            DsError::Worker {
                details: String::new(),
            },
            DsError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let codes: Vec<&str> = sample_errors().iter().map(DsError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_ds_prefix() {
        for err in sample_errors() {
            assert!(
                err.code().starts_with("DS-"),
                "code {} must start with DS-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = DsError::InvalidConfig {
            details: "bad value".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DS-1001"), "{msg}");
        assert!(msg.contains("bad value"), "{msg}");
    }

    #[test]
    fn client_fault_errors_are_schema_errors_only() {
        assert!(
            DsError::SchemaMismatch {
                got: 2,
                expected: 1
            }
            .is_client_fault()
        );
        assert!(
            !DsError::Worker {
                details: String::new()
            }
            .is_client_fault()
        );
    }

    #[test]
    fn retryable_errors_are_correct() {
        assert!(
            DsError::Io {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "test"),
            }
            .is_retryable()
        );
        assert!(
            DsError::PointerUnreadable {
                path: PathBuf::new(),
                attempts: 3,
                details: String::new()
            }
            .is_retryable()
        );
        assert!(!DsError::NoActiveBundle.is_retryable());
        assert!(
            !DsError::MissingConfig {
                path: PathBuf::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = DsError::io(
            "/tmp/test.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "DS-3002");
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: DsError = json_err.into();
        assert_eq!(err.code(), "DS-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: DsError = toml_err.into();
        assert_eq!(err.code(), "DS-1003");
    }
}
