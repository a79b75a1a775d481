//! Release error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type for release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error while reading archive {path}: {source}")]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not find {entry} in {path}")]
    MissingEntry { path: PathBuf, entry: &'static str },

    #[error("failed to parse {entry} in {path}: {source}")]
    Manifest {
        path: PathBuf,
        entry: &'static str,
        source: serde_yaml::Error,
    },

    #[error("invalid compiled package stemcell {value:?} in {path} (expected 'os/version')")]
    InvalidCompiledStemcell { path: PathBuf, value: String },

    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("couldn't calculate SHA1 sum of {path}: {source}")]
    Checksum {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid version constraint {constraint:?}: {message}")]
    InvalidConstraint { constraint: String, message: String },
}
