//! Publish a local release archive to an upload-capable source.

use crate::error::{Result, SyncError};
use kiln_fetcher::MultiReleaseSource;
use kiln_release::{ManifestReader, Remote, Requirement, TarballManifestReader};
use std::path::Path;

/// Upload `archive` to source `source_id`. The archive's identity comes from
/// its own manifest; a release already present there is never overwritten.
pub async fn upload_release(
    sources: &MultiReleaseSource,
    source_id: &str,
    archive: &Path,
) -> Result<Remote> {
    let uploader = sources.find_uploader(source_id)?;
    let manifest = TarballManifestReader.read_release_manifest(archive)?;

    let mut requirement = Requirement::new(&manifest.name, &manifest.version);
    if let Some(stemcell) = &manifest.stemcell {
        requirement = requirement.with_stemcell(stemcell);
    }

    let source = sources.find_by_id(source_id)?;
    let existing = source
        .get_matched_release(&requirement)
        .await
        .map_err(|e| e.scoped(source_id))?;
    if existing.is_some() {
        return Err(SyncError::AlreadyPublished {
            name: manifest.name,
            version: manifest.version,
            source_id: source_id.to_string(),
        });
    }

    tracing::info!(release = %requirement.name, version = %requirement.version, source_id = %source_id, "uploading release");
    Ok(uploader
        .upload_release(&requirement, archive)
        .await
        .map_err(|e| e.scoped(source_id))?)
}
