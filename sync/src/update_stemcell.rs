//! Move the lock to a new stemcell.
//!
//! Every locked release is re-resolved at its locked version against the new
//! stemcell before anything is written. Releases whose location doesn't
//! change (built releases, usually) keep their entry untouched.

use crate::download::{download_verified, ensure_dir, not_found};
use crate::error::Result;
use kiln_fetcher::MultiReleaseSource;
use kiln_kilnfile::{Kilnfile, KilnfileLockStore, ReleaseLock, Stemcell, WriteOutcome};
use kiln_release::{Requirement, VersionConstraint, read_stemcell_manifest};
use std::path::PathBuf;

/// Where the new stemcell comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StemcellInput {
    /// A stemcell tarball; OS and version are read from its `stemcell.MF`.
    Archive(PathBuf),
    Explicit(Stemcell),
}

impl StemcellInput {
    fn resolve(&self) -> Result<Stemcell> {
        match self {
            Self::Archive(path) => Ok(read_stemcell_manifest(path)?),
            Self::Explicit(stemcell) => Ok(stemcell.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateStemcellOptions {
    pub stemcell: StemcellInput,
    pub releases_dir: PathBuf,
    pub download_threads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StemcellOutcome {
    /// The Kilnfile's stemcell criteria reject the new stemcell.
    NotSatisfied { stemcell: Stemcell },
    /// The lock is already on this stemcell.
    Unchanged,
    Updated {
        stemcell: Stemcell,
        /// Names of releases whose entry changed.
        releases: Vec<String>,
        lock: WriteOutcome,
    },
}

pub async fn update_stemcell(
    sources: &MultiReleaseSource,
    kilnfile: &Kilnfile,
    store: &KilnfileLockStore,
    options: &UpdateStemcellOptions,
) -> Result<StemcellOutcome> {
    let stemcell = options.stemcell.resolve()?;
    if !criteria_accept(&kilnfile.stemcell, &stemcell)? {
        tracing::info!(os = %stemcell.os, version = %stemcell.version, "Nothing to update: stemcell does not satisfy the Kilnfile criteria");
        return Ok(StemcellOutcome::NotSatisfied { stemcell });
    }

    let mut lock = store.load()?;
    if lock.stemcell == stemcell {
        tracing::info!(os = %stemcell.os, version = %stemcell.version, "Kilnfile.lock is already on this stemcell");
        return Ok(StemcellOutcome::Unchanged);
    }

    let mut updates: Vec<ReleaseLock> = Vec::new();
    for entry in &lock.releases {
        let requirement = Requirement::new(&entry.name, &entry.version).with_stemcell(&stemcell);
        let remote = sources
            .get_matched_release(&requirement)
            .await?
            .ok_or_else(|| not_found(&requirement, sources))?;
        if entry.same_location(&remote.source_id, &remote.remote_path) {
            tracing::debug!(release = %entry.name, "location unchanged for new stemcell");
            continue;
        }

        ensure_dir(&options.releases_dir)?;
        let local = download_verified(
            sources,
            &options.releases_dir,
            &remote,
            remote.sha1.as_deref(),
            options.download_threads,
        )
        .await?;
        updates.push(ReleaseLock {
            name: entry.name.clone(),
            version: entry.version.clone(),
            sha1: local.sha1,
            remote_source: remote.source_id,
            remote_path: remote.remote_path,
        });
    }

    let mut releases = Vec::with_capacity(updates.len());
    for update in updates {
        if let Some(entry) = lock.find_release_mut(&update.name) {
            releases.push(update.name.clone());
            *entry = update;
        }
    }
    lock.stemcell = stemcell.clone();
    let outcome = store.save(&lock)?;
    tracing::info!(os = %stemcell.os, version = %stemcell.version, updated = releases.len(), "updated stemcell");
    Ok(StemcellOutcome::Updated {
        stemcell,
        releases,
        lock: outcome,
    })
}

/// The Kilnfile's `stemcell_criteria`: an OS (empty means any) and a version
/// constraint (empty means any).
fn criteria_accept(criteria: &Stemcell, stemcell: &Stemcell) -> Result<bool> {
    if !criteria.os.is_empty() && criteria.os != stemcell.os {
        return Ok(false);
    }
    Ok(VersionConstraint::parse(&criteria.version)?.matches(&stemcell.version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_check_os_and_version() {
        let criteria = Stemcell::new("ubuntu-jammy", "^1.200");
        assert!(criteria_accept(&criteria, &Stemcell::new("ubuntu-jammy", "1.260")).unwrap());
        assert!(!criteria_accept(&criteria, &Stemcell::new("ubuntu-jammy", "2.1")).unwrap());
        assert!(!criteria_accept(&criteria, &Stemcell::new("windows2019", "1.260")).unwrap());
        assert!(criteria_accept(&Stemcell::default(), &Stemcell::new("anything", "7")).unwrap());
    }
}
