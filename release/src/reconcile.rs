//! Three-way partition of a lock against a local inventory.
//!
//! Every requirement lands in exactly one of `intersection` (via the local
//! release that satisfied it) or `missing`; every local release lands in
//! exactly one of `intersection` or `extra`.

use crate::id::{ReleaseId, Requirement};
use crate::inventory::LocalRelease;
use kiln_kilnfile::KilnfileLock;
use std::collections::HashMap;

/// A requirement plus the checksum the lock recorded for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredRelease {
    pub requirement: Requirement,
    /// `None` when the lock has no checksum yet.
    pub expected_sha1: Option<String>,
}

impl RequiredRelease {
    fn accepts(&self, local: &LocalRelease) -> bool {
        local.satisfies(&self.requirement)
            && self
                .expected_sha1
                .as_deref()
                .is_none_or(|sha1| sha1 == local.local.sha1)
    }
}

/// Requirements in lock order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementSet {
    entries: Vec<RequiredRelease>,
}

impl RequirementSet {
    pub fn from_lock(lock: &KilnfileLock) -> Self {
        let entries = lock
            .releases
            .iter()
            .map(|release| RequiredRelease {
                requirement: Requirement::from_lock(release, &lock.stemcell),
                expected_sha1: (!release.sha1.is_empty()).then(|| release.sha1.clone()),
            })
            .collect();
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequiredRelease> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RequiredRelease> for RequirementSet {
    fn from_iter<I: IntoIterator<Item = RequiredRelease>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Local releases that satisfy a requirement, in inventory order.
    pub intersection: Vec<LocalRelease>,
    /// Requirements nothing on disk satisfies, in lock order.
    pub missing: Vec<RequiredRelease>,
    /// Local releases no requirement claims, in inventory order.
    pub extra: Vec<LocalRelease>,
}

impl Reconciliation {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Partition `required` against `local`.
///
/// A local release with the right name but wrong version, stemcell or
/// checksum is extra, and the requirement it failed stays missing. When two
/// local files satisfy the same requirement the first one wins and the
/// second is extra.
pub fn reconcile(required: &RequirementSet, local: &[LocalRelease]) -> Reconciliation {
    let mut pending: HashMap<ReleaseId, usize> = required
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.requirement.id(), index))
        .collect();

    let mut intersection = Vec::new();
    let mut extra = Vec::new();
    for release in local {
        let claimed = pending
            .get(release.id())
            .is_some_and(|&index| required.entries[index].accepts(release));
        if claimed {
            pending.remove(release.id());
            intersection.push(release.clone());
        } else {
            extra.push(release.clone());
        }
    }

    let missing = required
        .entries
        .iter()
        .filter(|entry| pending.contains_key(&entry.requirement.id()))
        .cloned()
        .collect();

    Reconciliation {
        intersection,
        missing,
        extra,
    }
}
