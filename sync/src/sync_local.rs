//! Point the lock at releases that exist only in a local directory.
//!
//! Each archive found on disk is assumed to live (or soon live) in one named
//! release source; its lock entry takes the archive's version and checksum
//! plus the path that source would store it under. Nothing is uploaded.

use crate::error::{Result, SyncError};
use kiln_fetcher::MultiReleaseSource;
use kiln_kilnfile::{KilnfileLockStore, ReleaseLock, WriteOutcome};
use kiln_release::{LocalInventory, Requirement};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SyncWithLocalOptions {
    pub releases_dir: PathBuf,
    /// The release source to record in updated entries.
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWithLocalReport {
    pub found: usize,
    /// Entries that differ from what was locked before.
    pub updated: Vec<ReleaseLock>,
    pub lock: WriteOutcome,
}

pub fn sync_with_local(
    sources: &MultiReleaseSource,
    store: &KilnfileLockStore,
    options: &SyncWithLocalOptions,
) -> Result<SyncWithLocalReport> {
    let mut lock = store.load()?;
    let generator = sources.find_path_generator(&options.source_id)?;

    tracing::info!(dir = %options.releases_dir.display(), "finding releases");
    let inventory = LocalInventory::new().scan(&options.releases_dir)?;
    tracing::info!(count = inventory.len(), "found releases on disk");

    let mut updates = Vec::with_capacity(inventory.len());
    for release in inventory.iter() {
        let id = release.id();
        let Some(entry) = lock.find_release(&id.name) else {
            return Err(SyncError::LocalReleaseNotInLock {
                name: id.name.clone(),
                path: release.local.local_path.clone(),
            });
        };
        let requirement = Requirement::new(&id.name, &id.version).with_stemcell(&lock.stemcell);
        let remote_path = generator
            .remote_path(&requirement)
            .map_err(|e| e.scoped(&options.source_id))?;

        let updated = ReleaseLock {
            name: entry.name.clone(),
            version: id.version.clone(),
            sha1: release.local.sha1.clone(),
            remote_source: options.source_id.clone(),
            remote_path,
        };
        if &updated != entry {
            updates.push(updated);
        }
    }

    if updates.is_empty() {
        tracing::info!("Kilnfile.lock already matches local releases");
        return Ok(SyncWithLocalReport {
            found: inventory.len(),
            updated: updates,
            lock: WriteOutcome::Unchanged,
        });
    }

    for update in &updates {
        if let Some(entry) = lock.find_release_mut(&update.name) {
            tracing::info!(release = %update.name, version = %update.version, "updated release from local archive");
            *entry = update.clone();
        }
    }
    let outcome = store.save(&lock)?;
    Ok(SyncWithLocalReport {
        found: inventory.len(),
        updated: updates,
        lock: outcome,
    })
}
