//! The release source contract.
//!
//! Every backend implements [`ReleaseSource`]. Uploading and computing a
//! remote path without listing are optional capabilities, discovered at
//! runtime through [`ReleaseSource::as_uploader`] and
//! [`ReleaseSource::as_path_generator`].

use crate::error::{Result, SourceError};
use async_trait::async_trait;
use kiln_release::{Local, Remote, Requirement, sha1_file};
use std::path::{Path, PathBuf};

/// `type:` value for object-storage sources in a Kilnfile.
pub const SOURCE_TYPE_S3: &str = "s3";

/// `type:` value for the public bosh.io index in a Kilnfile.
pub const SOURCE_TYPE_BOSH_IO: &str = "bosh.io";

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Stable identifier, unique within an aggregator.
    fn id(&self) -> &str;

    /// Whether the Kilnfile marks this source as safe to ship releases from.
    fn publishable(&self) -> bool {
        false
    }

    /// Locate the artifact for an exact name, version and stemcell.
    ///
    /// `Ok(None)` means the source answered and does not have it.
    async fn get_matched_release(&self, requirement: &Requirement) -> Result<Option<Remote>>;

    /// Locate the highest version satisfying `requirement.version` read as a
    /// constraint.
    async fn find_release_version(&self, requirement: &Requirement) -> Result<Option<Remote>>;

    /// Fetch `remote` into `dir` and checksum it. `download_threads` is a
    /// hint for backends that can transfer parts in parallel; `0` means the
    /// backend default.
    async fn download_release(
        &self,
        dir: &Path,
        remote: &Remote,
        download_threads: usize,
    ) -> Result<Local>;

    fn as_uploader(&self) -> Option<&dyn ReleaseUploader> {
        None
    }

    fn as_path_generator(&self) -> Option<&dyn RemotePathGenerator> {
        None
    }
}

/// Sources that accept publication.
#[async_trait]
pub trait ReleaseUploader: Send + Sync {
    /// Write the archive at `archive` to the location `requirement` maps to.
    async fn upload_release(&self, requirement: &Requirement, archive: &Path) -> Result<Remote>;
}

/// Sources that can name where a release would live without listing.
pub trait RemotePathGenerator: Send + Sync {
    fn remote_path(&self, requirement: &Requirement) -> Result<String>;
}

/// `dir/<file name of remote_path>`; a path with no file name falls back to
/// `<name>-<version>.tgz`.
pub(crate) fn download_destination(dir: &Path, remote: &Remote) -> PathBuf {
    let file_name = remote
        .remote_path
        .rsplit('/')
        .next()
        .map(|segment| segment.split('?').next().unwrap_or(segment))
        .filter(|name| !name.is_empty() && *name != "." && *name != "..");
    match file_name {
        Some(name) => dir.join(name),
        None => dir.join(format!("{}-{}.tgz", remote.id.name, remote.id.version)),
    }
}

/// Where a download into `dest` is written until it completes:
/// `.<file name>.partial` next to it. Scans skip these names, so an
/// interrupted transfer is never mistaken for a release.
pub(crate) fn partial_destination(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{file_name}.partial"))
}

/// Move a completed transfer to its final name. The partial file is removed
/// if the rename fails.
pub(crate) fn commit_download(partial: &Path, dest: &Path) -> Result<()> {
    std::fs::rename(partial, dest).map_err(|source| {
        remove_partial(partial);
        SourceError::Io {
            path: dest.to_path_buf(),
            source,
        }
    })
}

/// Checksum a freshly written file and describe it as a [`Local`]. The file
/// is removed if it can't be hashed.
pub(crate) fn finish_download(path: PathBuf, remote: &Remote) -> Result<Local> {
    match sha1_file(&path) {
        Ok(sha1) => Ok(Local::new(remote.id.clone(), path, sha1)),
        Err(err) => {
            remove_partial(&path);
            Err(SourceError::Release(err))
        }
    }
}

/// Best-effort cleanup of a download that did not complete.
pub(crate) fn remove_partial(path: &Path) {
    if let Err(err) = std::fs::remove_file(path)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove partial download");
    }
}
