//! Make a releases directory match the Kilnfile.lock.
//!
//! The directory is scanned and reconciled against the lock first; only
//! releases nothing on disk satisfies are located and downloaded. Locked
//! checksums are enforced. The lock itself is rewritten only to fill in
//! checksums or locations it didn't record yet, and only after every
//! download succeeded.

use crate::download::{download_verified, ensure_dir, not_found};
use crate::error::{ReleaseFailure, Result, SyncError};
use kiln_fetcher::MultiReleaseSource;
use kiln_kilnfile::{KilnfileLock, KilnfileLockStore, ReleaseLock, WriteOutcome};
use kiln_release::{
    Local, LocalInventory, LocalRelease, Remote, RequiredRelease, RequirementSet, reconcile,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub releases_dir: PathBuf,
    /// Concurrent part transfers per download; 0 uses the backend default.
    pub download_threads: usize,
    /// Delete local archives the lock doesn't ask for.
    pub delete_extra: bool,
    /// Keep downloading after a failure and report every failure at the end.
    pub keep_going: bool,
}

impl FetchOptions {
    pub fn new(releases_dir: impl Into<PathBuf>) -> Self {
        Self {
            releases_dir: releases_dir.into(),
            download_threads: 0,
            delete_extra: false,
            keep_going: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Releases that were already on disk.
    pub satisfied: Vec<LocalRelease>,
    pub downloaded: Vec<Local>,
    pub deleted: Vec<PathBuf>,
    /// `None` when the lock had nothing to record.
    pub lock: Option<WriteOutcome>,
}

/// What a successful download adds to its lock entry.
#[derive(Debug)]
struct LockFill {
    name: String,
    sha1: String,
    remote_source: String,
    remote_path: String,
}

impl LockFill {
    /// Set fields the entry left empty. Returns whether anything changed.
    fn apply(&self, entry: &mut ReleaseLock) -> bool {
        let mut changed = false;
        if entry.sha1.is_empty() {
            entry.sha1 = self.sha1.clone();
            changed = true;
        }
        if entry.remote_source.is_empty() && entry.remote_path.is_empty() {
            entry.remote_source = self.remote_source.clone();
            entry.remote_path = self.remote_path.clone();
            changed = true;
        }
        changed
    }
}

pub async fn fetch(
    sources: &MultiReleaseSource,
    store: &KilnfileLockStore,
    options: &FetchOptions,
) -> Result<FetchReport> {
    let mut lock = store.load()?;
    ensure_dir(&options.releases_dir)?;

    let inventory = LocalInventory::new().scan(&options.releases_dir)?;
    let required = RequirementSet::from_lock(&lock);
    let reconciliation = reconcile(&required, inventory.as_slice());
    tracing::info!(
        satisfied = reconciliation.intersection.len(),
        missing = reconciliation.missing.len(),
        extra = reconciliation.extra.len(),
        "reconciled releases directory against Kilnfile.lock"
    );

    let mut report = FetchReport {
        satisfied: reconciliation.intersection,
        ..FetchReport::default()
    };
    if options.delete_extra {
        report.deleted = delete_extra(&reconciliation.extra);
    }

    check_remote_sources(sources, &lock, &reconciliation.missing)?;

    let mut fills = Vec::with_capacity(reconciliation.missing.len());
    let mut failures = Vec::new();
    for required in &reconciliation.missing {
        match fetch_one(sources, &lock, required, options).await {
            Ok((local, fill)) => {
                report.downloaded.push(local);
                fills.push(fill);
            }
            Err(error) if options.keep_going => {
                tracing::warn!(release = %required.requirement.name, error = %error, "failed to fetch release");
                failures.push(ReleaseFailure {
                    release: required.requirement.name.clone(),
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }
    if !failures.is_empty() {
        return Err(SyncError::Batch {
            total: reconciliation.missing.len(),
            failures,
        });
    }

    let mut changed = false;
    for fill in &fills {
        if let Some(entry) = lock.find_release_mut(&fill.name) {
            changed |= fill.apply(entry);
        }
    }
    if changed {
        report.lock = Some(store.save(&lock)?);
    }
    Ok(report)
}

/// Every locked source a missing release depends on must still exist.
fn check_remote_sources(
    sources: &MultiReleaseSource,
    lock: &KilnfileLock,
    missing: &[RequiredRelease],
) -> Result<()> {
    for required in missing {
        let Some(entry) = lock.find_release(&required.requirement.name) else {
            continue;
        };
        if !entry.remote_source.is_empty() && sources.find_by_id(&entry.remote_source).is_err() {
            return Err(SyncError::UnknownRemoteSource {
                release: entry.name.clone(),
                source_id: entry.remote_source.clone(),
                available: sources.ids(),
            });
        }
    }
    Ok(())
}

async fn fetch_one(
    sources: &MultiReleaseSource,
    lock: &KilnfileLock,
    required: &RequiredRelease,
    options: &FetchOptions,
) -> Result<(Local, LockFill)> {
    let requirement = &required.requirement;
    let remote = match lock.find_release(&requirement.name) {
        Some(entry) if !entry.remote_source.is_empty() && !entry.remote_path.is_empty() => {
            Remote::from_lock(entry)
        }
        _ => sources
            .get_matched_release(requirement)
            .await?
            .ok_or_else(|| not_found(requirement, sources))?,
    };

    tracing::info!(release = %requirement.name, version = %requirement.version, source_id = %remote.source_id, "downloading release");
    let local = download_verified(
        sources,
        &options.releases_dir,
        &remote,
        required.expected_sha1.as_deref(),
        options.download_threads,
    )
    .await?;

    let fill = LockFill {
        name: requirement.name.clone(),
        sha1: local.sha1.clone(),
        remote_source: remote.source_id,
        remote_path: remote.remote_path,
    };
    Ok((local, fill))
}

fn delete_extra(extra: &[LocalRelease]) -> Vec<PathBuf> {
    let mut deleted = Vec::new();
    for release in extra {
        let path: &Path = &release.local.local_path;
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(release = %release.id(), path = %path.display(), "deleted extra release");
                deleted.push(path.to_path_buf());
            }
            Err(err) => {
                tracing::warn!(release = %release.id(), path = %path.display(), error = %err, "failed to delete extra release");
            }
        }
    }
    deleted
}
