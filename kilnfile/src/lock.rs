//! The Kilnfile.lock: one pinned entry per release plus the exact stemcell.

use crate::kilnfile::Stemcell;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Persisted resolution of every release a tile needs.
///
/// Field order here is the field order on disk; keep it stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnfileLock {
    #[serde(default)]
    pub releases: Vec<ReleaseLock>,

    #[serde(default, rename = "stemcell_criteria")]
    pub stemcell: Stemcell,
}

/// A single pinned release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLock {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub remote_source: String,
    #[serde(default)]
    pub remote_path: String,
}

impl ReleaseLock {
    /// True when both the source and the path inside it are the same.
    pub fn same_location(&self, remote_source: &str, remote_path: &str) -> bool {
        self.remote_source == remote_source && self.remote_path == remote_path
    }
}

impl KilnfileLock {
    pub fn find_release(&self, name: &str) -> Option<&ReleaseLock> {
        self.releases.iter().find(|r| r.name == name)
    }

    pub fn find_release_mut(&mut self, name: &str) -> Option<&mut ReleaseLock> {
        self.releases.iter_mut().find(|r| r.name == name)
    }

    /// First release name that appears more than once, if any.
    pub fn duplicate_release_name(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.releases
            .iter()
            .map(|r| r.name.as_str())
            .find(|name| !seen.insert(*name))
    }

    /// Distinct `remote_source` values, in first-seen order. Entries that were
    /// never located (empty source) are skipped.
    pub fn remote_sources(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.releases
            .iter()
            .map(|r| r.remote_source.as_str())
            .filter(|s| !s.is_empty() && seen.insert(*s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lock(name: &str, source: &str) -> ReleaseLock {
        ReleaseLock {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            sha1: "abc".to_string(),
            remote_source: source.to_string(),
            remote_path: format!("{name}.tgz"),
        }
    }

    #[test]
    fn detects_duplicate_release_names() {
        let mut kilnfile_lock = KilnfileLock {
            releases: vec![lock("bpm", "a"), lock("uaa", "a")],
            stemcell: Stemcell::default(),
        };
        assert_eq!(kilnfile_lock.duplicate_release_name(), None);

        kilnfile_lock.releases.push(lock("bpm", "b"));
        assert_eq!(kilnfile_lock.duplicate_release_name(), Some("bpm"));
    }

    #[test]
    fn remote_sources_are_distinct_and_ordered() {
        let kilnfile_lock = KilnfileLock {
            releases: vec![lock("bpm", "b"), lock("uaa", "a"), lock("capi", "b"), lock("x", "")],
            stemcell: Stemcell::default(),
        };
        assert_eq!(kilnfile_lock.remote_sources(), vec!["b", "a"]);
    }

    #[test]
    fn same_location_compares_source_and_path() {
        let entry = lock("bpm", "a");
        assert!(entry.same_location("a", "bpm.tgz"));
        assert!(!entry.same_location("b", "bpm.tgz"));
        assert!(!entry.same_location("a", "other.tgz"));
    }
}
