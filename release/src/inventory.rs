//! Scanning a releases directory.
//!
//! Every regular file is offered to a [`ManifestReader`]; files it can't
//! read (not an archive, no `release.MF`, permission denied) are skipped
//! with a debug log. The scan never touches the network.

use crate::checksum::sha1_file;
use crate::error::{ReleaseError, Result};
use crate::id::{Local, ReleaseId, Requirement};
use crate::manifest::{ManifestReader, TarballManifestReader};
use kiln_kilnfile::Stemcell;
use std::path::Path;
use walkdir::WalkDir;

/// A release archive found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRelease {
    pub local: Local,
    /// Set when the archive holds compiled packages.
    pub stemcell: Option<Stemcell>,
}

impl LocalRelease {
    pub fn id(&self) -> &ReleaseId {
        &self.local.id
    }

    /// Name and version match, and a compiled release targets the
    /// requirement's stemcell.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        self.local.id.name == requirement.name
            && self.local.id.version == requirement.version
            && self.stemcell.as_ref().is_none_or(|stemcell| {
                stemcell.os == requirement.stemcell_os
                    && stemcell.version == requirement.stemcell_version
            })
    }
}

/// Releases found by a scan, in file-name order.
///
/// Two archives with the same identity are both kept; reconciliation
/// matches the first against the lock and reports the rest as extra, which
/// is how `fetch --delete-extra` finds stray copies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    releases: Vec<LocalRelease>,
}

impl Inventory {
    pub fn new(releases: Vec<LocalRelease>) -> Self {
        Self { releases }
    }

    /// First release with this identity.
    pub fn get(&self, id: &ReleaseId) -> Option<&LocalRelease> {
        self.releases.iter().find(|release| release.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalRelease> {
        self.releases.iter()
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn as_slice(&self) -> &[LocalRelease] {
        &self.releases
    }
}

impl IntoIterator for Inventory {
    type Item = LocalRelease;
    type IntoIter = std::vec::IntoIter<LocalRelease>;

    fn into_iter(self) -> Self::IntoIter {
        self.releases.into_iter()
    }
}

/// Builds an [`Inventory`] from a directory.
#[derive(Debug, Clone)]
pub struct LocalInventory<R = TarballManifestReader> {
    reader: R,
    recursive: bool,
}

impl Default for LocalInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalInventory {
    pub fn new() -> Self {
        Self {
            reader: TarballManifestReader,
            recursive: false,
        }
    }
}

impl<R: ManifestReader> LocalInventory<R> {
    pub fn with_reader<S: ManifestReader>(self, reader: S) -> LocalInventory<S> {
        LocalInventory {
            reader,
            recursive: self.recursive,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn scan(&self, dir: &Path) -> Result<Inventory> {
        std::fs::read_dir(dir).map_err(|source| ReleaseError::DirectoryRead {
            path: dir.to_path_buf(),
            source,
        })?;

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut releases = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let file_name = entry.file_name().to_string_lossy();
            if !entry.file_type().is_file()
                || file_name.starts_with('.')
                || file_name.ends_with(".partial")
            {
                continue;
            }

            let path = entry.path();
            let manifest = match self.reader.read_release_manifest(path) {
                Ok(manifest) => manifest,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "not a release archive");
                    continue;
                }
            };
            let sha1 = match sha1_file(path) {
                Ok(sha1) => sha1,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "skipping unhashable file");
                    continue;
                }
            };

            tracing::trace!(name = %manifest.name, version = %manifest.version, path = %path.display(), "found local release");
            releases.push(LocalRelease {
                local: Local::new(ReleaseId::new(manifest.name, manifest.version), path, sha1),
                stemcell: manifest.stemcell,
            });
        }

        tracing::debug!(dir = %dir.display(), count = releases.len(), "scanned releases directory");
        Ok(Inventory::new(releases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ReleaseManifest;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Treats `<name>-<version>.tgz` as a release, anything else as garbage.
    struct FileNameReader;

    impl ManifestReader for FileNameReader {
        fn read_release_manifest(&self, path: &Path) -> Result<ReleaseManifest> {
            let stem = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".tgz"))
                .and_then(|n| n.rsplit_once('-'));
            match stem {
                Some((name, version)) => Ok(ReleaseManifest {
                    name: name.to_string(),
                    version: version.to_string(),
                    stemcell: None,
                }),
                None => Err(ReleaseError::MissingEntry {
                    path: path.to_path_buf(),
                    entry: "release.MF",
                }),
            }
        }
    }

    #[test]
    fn skips_non_release_files() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("uaa-1.2.3.tgz"), "a").expect("write");
        std::fs::write(dir.path().join("bpm-1.1.9.tgz"), "b").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "c").expect("write");
        std::fs::write(dir.path().join(".capi-1.0.0.tgz"), "d").expect("write");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("nested/cflinuxfs-3.0.tgz"), "e").expect("write");

        let inventory = LocalInventory::new()
            .with_reader(FileNameReader)
            .scan(dir.path())
            .expect("scan");

        let ids: Vec<String> = inventory.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["bpm@1.1.9".to_string(), "uaa@1.2.3".to_string()]);
        let uaa = inventory.get(&ReleaseId::new("uaa", "1.2.3")).expect("uaa");
        assert_eq!(uaa.local.sha1, "86f7e437faa5a7fce15d1ddcb9eaeaea377667b8");
    }

    /// Reads every file as a release named after the file.
    struct AnyFileReader;

    impl ManifestReader for AnyFileReader {
        fn read_release_manifest(&self, path: &Path) -> Result<ReleaseManifest> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            Ok(ReleaseManifest {
                name: name.to_string(),
                version: "1".to_string(),
                stemcell: None,
            })
        }
    }

    #[test]
    fn skips_unfinished_downloads() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("uaa-1.2.3.tgz"), "a").expect("write");
        std::fs::write(dir.path().join(".bpm-1.1.9.tgz.partial"), "b").expect("write");
        std::fs::write(dir.path().join("capi-1.0.0.tgz.partial"), "c").expect("write");

        let inventory = LocalInventory::new()
            .with_reader(AnyFileReader)
            .scan(dir.path())
            .expect("scan");

        let ids: Vec<String> = inventory.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["uaa-1.2.3.tgz@1".to_string()]);
    }

    #[test]
    fn keeps_duplicate_identities_in_file_order() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("uaa-1.2.3.tgz"), "a").expect("write");
        std::fs::write(dir.path().join("copy-of-uaa.tgz"), "b").expect("write");

        struct FixedReader;
        impl ManifestReader for FixedReader {
            fn read_release_manifest(&self, _path: &Path) -> Result<ReleaseManifest> {
                Ok(ReleaseManifest {
                    name: "uaa".to_string(),
                    version: "1.2.3".to_string(),
                    stemcell: None,
                })
            }
        }

        let inventory = LocalInventory::new()
            .with_reader(FixedReader)
            .scan(dir.path())
            .expect("scan");

        assert_eq!(inventory.len(), 2);
        let first = inventory.get(&ReleaseId::new("uaa", "1.2.3")).expect("uaa");
        assert_eq!(first.local.local_path, dir.path().join("copy-of-uaa.tgz"));
    }

    #[test]
    fn recursive_scan_descends() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("nested/cflinuxfs-3.0.tgz"), "e").expect("write");

        let inventory = LocalInventory::new()
            .with_reader(FileNameReader)
            .recursive(true)
            .scan(dir.path())
            .expect("scan");
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let err = LocalInventory::new().scan(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ReleaseError::DirectoryRead { .. }));
    }

    #[test]
    fn compiled_release_must_match_stemcell() {
        let release = LocalRelease {
            local: Local::new(ReleaseId::new("uaa", "1.2.3"), "uaa.tgz", "abc"),
            stemcell: Some(Stemcell::new("ubuntu-xenial", "621.55")),
        };
        let xenial = Stemcell::new("ubuntu-xenial", "621.55");
        let jammy = Stemcell::new("ubuntu-jammy", "1.18");

        assert!(release.satisfies(&Requirement::new("uaa", "1.2.3").with_stemcell(&xenial)));
        assert!(!release.satisfies(&Requirement::new("uaa", "1.2.3").with_stemcell(&jammy)));
        assert!(!release.satisfies(&Requirement::new("uaa", "1.2.4").with_stemcell(&xenial)));
    }
}
