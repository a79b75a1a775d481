//! Release source errors

use kiln_release::ReleaseError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for release source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Failure talking to object storage.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("{operation} s3://{bucket}/{key} failed: {message}")]
    Request {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SourceError {
    // ─── configuration ────────────────────────────────────────────────────
    #[error("release source {source_id:?}: invalid regex {pattern:?}: {message}")]
    InvalidRegex {
        source_id: String,
        pattern: String,
        message: String,
    },

    #[error(
        "release source {source_id:?}: missing some capture group. Required capture groups: {required}"
    )]
    MissingCaptureGroups { source_id: String, required: String },

    #[error("release source {source_id:?}: unable to parse path_template: {message}")]
    InvalidTemplate { source_id: String, message: String },

    #[error("release source {source_id:?}: unable to evaluate path_template for {release}: {message}")]
    TemplateRender {
        source_id: String,
        release: String,
        message: String,
    },

    #[error("release source {source_id:?}: {message}")]
    InvalidConfig { source_id: String, message: String },

    #[error("release_sources must have unique IDs; items at index {first} and {second} both have ID {id:?}")]
    DuplicateId {
        first: usize,
        second: usize,
        id: String,
    },

    #[error("release source type {kind:?} is not supported; expected one of {expected}")]
    UnknownType { kind: String, expected: String },

    // ─── routing / capability ─────────────────────────────────────────────
    #[error("couldn't find a release source with ID {id:?}. Available choices: {available:?}")]
    UnknownSource { id: String, available: Vec<String> },

    #[error("no upload-capable release sources were found in the Kilnfile")]
    NoUploadSources,

    #[error(
        "release source {id:?} does not accept uploads; available upload-compatible sources are: {available:?}"
    )]
    UploadUnsupported { id: String, available: Vec<String> },

    #[error("release source {id:?} cannot compute remote paths")]
    RemotePathUnsupported { id: String },

    // ─── backend ──────────────────────────────────────────────────────────
    #[error(transparent)]
    Store(#[from] ObjectStoreError),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("response to GET {url} got status {status} when a success was expected")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("error from release source {source_id:?}: {source}")]
    FromSource {
        source_id: String,
        source: Box<SourceError>,
    },
}

impl SourceError {
    /// Scope an error to the source that raised it. Already-scoped errors
    /// are left alone.
    pub fn scoped(self, source_id: &str) -> Self {
        match self {
            scoped @ Self::FromSource { .. } => scoped,
            other => Self::FromSource {
                source_id: source_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any source scoping removed.
    pub fn root(&self) -> &SourceError {
        match self {
            Self::FromSource { source, .. } => source.root(),
            other => other,
        }
    }

    /// Raised before any I/O because the Kilnfile or a requirement is wrong.
    pub fn is_configuration(&self) -> bool {
        match self.root() {
            Self::InvalidRegex { .. }
            | Self::MissingCaptureGroups { .. }
            | Self::InvalidTemplate { .. }
            | Self::TemplateRender { .. }
            | Self::InvalidConfig { .. }
            | Self::DuplicateId { .. }
            | Self::UnknownType { .. }
            | Self::NoUploadSources
            | Self::UploadUnsupported { .. }
            | Self::RemotePathUnsupported { .. } => true,
            Self::Release(ReleaseError::InvalidConstraint { .. }) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scoping_is_applied_once() {
        let err = SourceError::NoUploadSources.scoped("a").scoped("b");
        assert_eq!(
            err.to_string(),
            "error from release source \"a\": no upload-capable release sources were found in the Kilnfile"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn backend_errors_are_not_configuration() {
        let err = SourceError::UnexpectedStatus {
            url: "https://bosh.io/api".to_string(),
            status: 502,
        };
        assert!(!err.scoped("bosh.io").is_configuration());
    }
}
