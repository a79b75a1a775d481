//! Bump one locked release to a new version.

use crate::download::{download_verified, ensure_dir, not_found};
use crate::error::{Result, SyncError};
use kiln_fetcher::MultiReleaseSource;
use kiln_kilnfile::{KilnfileLockStore, ReleaseLock, WriteOutcome};
use kiln_release::{Requirement, VersionConstraint};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct UpdateReleaseOptions {
    pub name: String,
    /// Matched literally first; if nothing has that exact version it is read
    /// as a constraint and resolved to the highest match.
    pub version: String,
    pub releases_dir: PathBuf,
    pub download_threads: usize,
    /// Record the new location without transferring the archive.
    pub without_download: bool,
}

impl UpdateReleaseOptions {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        releases_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            releases_dir: releases_dir.into(),
            download_threads: 0,
            without_download: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The lock already points at the resolved release; nothing was written.
    NoChange,
    Updated {
        previous: ReleaseLock,
        current: ReleaseLock,
        lock: WriteOutcome,
    },
}

pub async fn update_release(
    sources: &MultiReleaseSource,
    store: &KilnfileLockStore,
    options: &UpdateReleaseOptions,
) -> Result<UpdateOutcome> {
    let mut lock = store.load()?;
    let Some(previous) = lock.find_release(&options.name).cloned() else {
        return Err(SyncError::ReleaseNotInLock {
            name: options.name.clone(),
        });
    };

    let requirement =
        Requirement::new(&options.name, &options.version).with_stemcell(&lock.stemcell);
    tracing::info!(release = %requirement.name, version = %requirement.version, "searching for the release");
    let remote = match sources.get_matched_release(&requirement).await? {
        Some(remote) => Some(remote),
        None if VersionConstraint::parse(&options.version)?.is_exact() => None,
        None => sources.find_release_version(&requirement).await?,
    }
    .ok_or_else(|| not_found(&requirement, sources))?;

    if previous.version == remote.id.version
        && previous.same_location(&remote.source_id, &remote.remote_path)
    {
        tracing::info!(release = %previous.name, version = %previous.version, "No changes made");
        return Ok(UpdateOutcome::NoChange);
    }

    let sha1 = if options.without_download {
        remote
            .sha1
            .clone()
            .unwrap_or_else(|| previous.sha1.clone())
    } else {
        ensure_dir(&options.releases_dir)?;
        download_verified(
            sources,
            &options.releases_dir,
            &remote,
            remote.sha1.as_deref(),
            options.download_threads,
        )
        .await?
        .sha1
    };

    let current = ReleaseLock {
        name: previous.name.clone(),
        version: remote.id.version.clone(),
        sha1,
        remote_source: remote.source_id.clone(),
        remote_path: remote.remote_path.clone(),
    };
    if let Some(entry) = lock.find_release_mut(&options.name) {
        *entry = current.clone();
    }
    let outcome = store.save(&lock)?;
    tracing::info!(
        release = %current.name,
        from = %previous.version,
        to = %current.version,
        source_id = %current.remote_source,
        "updated release; don't forget to commit the Kilnfile.lock"
    );
    Ok(UpdateOutcome::Updated {
        previous,
        current,
        lock: outcome,
    })
}
