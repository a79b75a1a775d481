//! Helpers shared by the write-paths that transfer bytes.

use crate::error::{Result, SyncError};
use kiln_fetcher::MultiReleaseSource;
use kiln_release::{Local, Remote, Requirement};
use std::path::Path;

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| SyncError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Download `remote` and check it against `expected` (empty means unchecked).
/// On a mismatch the file is deleted before the error is returned.
pub(crate) async fn download_verified(
    sources: &MultiReleaseSource,
    dir: &Path,
    remote: &Remote,
    expected: Option<&str>,
    download_threads: usize,
) -> Result<Local> {
    let local = sources
        .download_release(dir, remote, download_threads)
        .await?;
    match expected {
        Some(expected) if !expected.is_empty() && expected != local.sha1 => {
            if let Err(err) = std::fs::remove_file(&local.local_path) {
                tracing::warn!(path = %local.local_path.display(), error = %err, "failed to remove release with bad checksum");
            }
            Err(SyncError::ChecksumMismatch {
                release: local.id.name,
                expected: expected.to_string(),
                actual: local.sha1,
            })
        }
        _ => Ok(local),
    }
}

pub(crate) fn not_found(requirement: &Requirement, sources: &MultiReleaseSource) -> SyncError {
    SyncError::NotFound {
        release: requirement.name.clone(),
        version: requirement.version.clone(),
        stemcell_os: requirement.stemcell_os.clone(),
        stemcell_version: requirement.stemcell_version.clone(),
        sources: sources.ids(),
    }
}
