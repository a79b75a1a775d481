//! Error taxonomy for the lock write-paths.

use kiln_fetcher::SourceError;
use kiln_kilnfile::KilnfileError;
use kiln_release::ReleaseError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Broad class of a [`SyncError`], for exit codes and structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Kilnfile or source settings are wrong; nothing was fetched
    Configuration,
    /// No source has the requested release
    Resolution,
    /// A source failed to answer or transfer
    Backend,
    /// Downloaded bytes don't hash to the locked SHA1
    Integrity,
    /// The lock disagrees with the Kilnfile or the releases directory
    LockConsistency,
    Io,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Resolution => "RESOLUTION_ERROR",
            Self::Backend => "BACKEND_ERROR",
            Self::Integrity => "INTEGRITY_ERROR",
            Self::LockConsistency => "LOCK_CONSISTENCY_ERROR",
            Self::Io => "IO_ERROR",
        }
    }
}

/// One release that failed during a keep-going fetch.
#[derive(Debug)]
pub struct ReleaseFailure {
    pub release: String,
    pub error: SyncError,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Kilnfile(#[from] KilnfileError),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(
        "couldn't find {release} {version} (stemcell {stemcell_os} {stemcell_version}) in any release source; sources consulted: {sources:?}"
    )]
    NotFound {
        release: String,
        version: String,
        stemcell_os: String,
        stemcell_version: String,
        sources: Vec<String>,
    },

    #[error(
        "downloaded release {release:?} had an incorrect SHA1 - expected {expected:?}, got {actual:?}"
    )]
    ChecksumMismatch {
        release: String,
        expected: String,
        actual: String,
    },

    #[error(
        "release {release:?} is locked to release source {source_id:?}, which is not configured in the Kilnfile. Available choices: {available:?}"
    )]
    UnknownRemoteSource {
        release: String,
        source_id: String,
        available: Vec<String>,
    },

    #[error("a release with name {name:?} and version {version:?} already exists on {source_id}")]
    AlreadyPublished {
        name: String,
        version: String,
        source_id: String,
    },

    #[error("no release named {name:?} exists in your Kilnfile.lock")]
    ReleaseNotInLock { name: String },

    #[error("the local release {name:?} ({path}) does not exist in the Kilnfile.lock")]
    LocalReleaseNotInLock { name: String, path: PathBuf },

    #[error("failed to prepare directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} of {total} releases failed:{}", .failures.len(), summarize(.failures))]
    Batch {
        total: usize,
        failures: Vec<ReleaseFailure>,
    },
}

fn summarize(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n  {}: {}", failure.release, failure.error))
        .collect()
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Kilnfile(err) => match err {
                KilnfileError::Read { .. } | KilnfileError::Write { .. } => ErrorCategory::Io,
                KilnfileError::DuplicateRelease { .. } => ErrorCategory::LockConsistency,
                KilnfileError::Parse { .. } | KilnfileError::Serialize { .. } => {
                    ErrorCategory::Configuration
                }
            },
            Self::Release(ReleaseError::InvalidConstraint { .. }) => ErrorCategory::Configuration,
            Self::Release(_) => ErrorCategory::Io,
            Self::Source(err) => source_category(err),
            Self::NotFound { .. } | Self::AlreadyPublished { .. } => ErrorCategory::Resolution,
            Self::ChecksumMismatch { .. } => ErrorCategory::Integrity,
            Self::UnknownRemoteSource { .. }
            | Self::ReleaseNotInLock { .. }
            | Self::LocalReleaseNotInLock { .. } => ErrorCategory::LockConsistency,
            Self::Io { .. } => ErrorCategory::Io,
            Self::Batch { failures, .. } => failures
                .first()
                .map(|failure| failure.error.category())
                .unwrap_or(ErrorCategory::Backend),
        }
    }
}

fn source_category(err: &SourceError) -> ErrorCategory {
    if err.is_configuration() {
        return ErrorCategory::Configuration;
    }
    match err.root() {
        SourceError::UnknownSource { .. } => ErrorCategory::Configuration,
        SourceError::Io { .. } | SourceError::Release(_) => ErrorCategory::Io,
        _ => ErrorCategory::Backend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn batch_lists_every_failure() {
        let err = SyncError::Batch {
            total: 3,
            failures: vec![
                ReleaseFailure {
                    release: "uaa".to_string(),
                    error: SyncError::ChecksumMismatch {
                        release: "uaa".to_string(),
                        expected: "aaa".to_string(),
                        actual: "bbb".to_string(),
                    },
                },
                ReleaseFailure {
                    release: "capi".to_string(),
                    error: SyncError::ReleaseNotInLock {
                        name: "capi".to_string(),
                    },
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 of 3 releases failed:\n  uaa: downloaded release \"uaa\" had an incorrect SHA1 - expected \"aaa\", got \"bbb\"\n  capi: no release named \"capi\" exists in your Kilnfile.lock"
        );
        assert_eq!(err.category(), ErrorCategory::Integrity);
    }

    #[test]
    fn scoped_source_errors_keep_their_category() {
        let unknown = SyncError::from(
            SourceError::UnknownSource {
                id: "ghost-bucket".to_string(),
                available: vec![],
            }
            .scoped("multi"),
        );
        assert_eq!(unknown.category(), ErrorCategory::Configuration);

        let backend = SyncError::from(
            SourceError::UnexpectedStatus {
                url: "https://bosh.io/api".to_string(),
                status: 503,
            }
            .scoped("bosh.io"),
        );
        assert_eq!(backend.category(), ErrorCategory::Backend);
    }
}
