//! Errors raised while reading or writing Kilnfiles.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error used by pluggable serializers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for Kilnfile operations
pub type Result<T> = std::result::Result<T, KilnfileError>;

#[derive(Debug, Error)]
pub enum KilnfileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize Kilnfile.lock: {source}")]
    Serialize {
        #[source]
        source: BoxError,
    },

    #[error("release {name:?} appears more than once in {path}")]
    DuplicateRelease { name: String, path: PathBuf },
}
