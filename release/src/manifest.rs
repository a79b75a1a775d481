//! Reading `release.MF` and `stemcell.MF` out of gzipped tarballs.

use crate::error::{ReleaseError, Result};
use flate2::read::GzDecoder;
use kiln_kilnfile::Stemcell;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::io::Read;
use std::path::Path;

const RELEASE_MANIFEST: &str = "release.MF";
const STEMCELL_MANIFEST: &str = "stemcell.MF";

/// What kiln needs from a release archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseManifest {
    pub name: String,
    pub version: String,
    /// Present only for compiled releases.
    pub stemcell: Option<Stemcell>,
}

/// Extracts release metadata from a file on disk.
pub trait ManifestReader: Send + Sync {
    fn read_release_manifest(&self, path: &Path) -> Result<ReleaseManifest>;
}

/// Reads BOSH release tarballs (`.tgz`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TarballManifestReader;

impl ManifestReader for TarballManifestReader {
    fn read_release_manifest(&self, path: &Path) -> Result<ReleaseManifest> {
        let bytes = read_archive_entry(path, RELEASE_MANIFEST)?;
        let raw: RawReleaseManifest =
            serde_yaml::from_slice(&bytes).map_err(|source| ReleaseError::Manifest {
                path: path.to_path_buf(),
                entry: RELEASE_MANIFEST,
                source,
            })?;

        let stemcell = match raw.compiled_packages.first() {
            Some(package) => {
                let (os, version) = package.stemcell.split_once('/').ok_or_else(|| {
                    ReleaseError::InvalidCompiledStemcell {
                        path: path.to_path_buf(),
                        value: package.stemcell.clone(),
                    }
                })?;
                Some(Stemcell::new(os, version))
            }
            None => None,
        };

        Ok(ReleaseManifest {
            name: raw.name,
            version: raw.version,
            stemcell,
        })
    }
}

/// Operating system and version from a stemcell tarball's `stemcell.MF`.
pub fn read_stemcell_manifest(path: &Path) -> Result<Stemcell> {
    let bytes = read_archive_entry(path, STEMCELL_MANIFEST)?;
    let raw: RawStemcellManifest =
        serde_yaml::from_slice(&bytes).map_err(|source| ReleaseError::Manifest {
            path: path.to_path_buf(),
            entry: STEMCELL_MANIFEST,
            source,
        })?;
    Ok(Stemcell::new(raw.operating_system, raw.version))
}

#[derive(Deserialize)]
struct RawReleaseManifest {
    name: String,
    #[serde(deserialize_with = "string_or_number")]
    version: String,
    #[serde(default)]
    compiled_packages: Vec<RawCompiledPackage>,
}

#[derive(Deserialize)]
struct RawCompiledPackage {
    #[serde(default)]
    stemcell: String,
}

#[derive(Deserialize)]
struct RawStemcellManifest {
    operating_system: String,
    #[serde(deserialize_with = "string_or_number")]
    version: String,
}

// Unquoted `version: 621.55` arrives as a YAML float.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected a version string, got {other:?}"))),
    }
}

/// Bytes of the first entry whose file name is `entry`, at any depth.
fn read_archive_entry(path: &Path, entry: &'static str) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path).map_err(|source| ReleaseError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let archive_err = |source| ReleaseError::Archive {
        path: path.to_path_buf(),
        source,
    };

    let mut archive = tar::Archive::new(GzDecoder::new(file));
    for item in archive.entries().map_err(archive_err)? {
        let mut item = item.map_err(archive_err)?;
        let matches = item
            .path()
            .map_err(archive_err)?
            .file_name()
            .is_some_and(|name| name == entry);
        if matches {
            let mut bytes = Vec::new();
            item.read_to_end(&mut bytes).map_err(archive_err)?;
            return Ok(bytes);
        }
    }

    Err(ReleaseError::MissingEntry {
        path: path.to_path_buf(),
        entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_tgz(path: &Path, entries: &[(&str, &str)]) {
        let file = std::fs::File::create(path).expect("create");
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, body.as_bytes())
                .expect("append");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip");
    }

    #[test]
    fn reads_compiled_release() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("uaa.tgz");
        write_tgz(
            &path,
            &[
                ("./packages/uaa.tgz", "binary"),
                (
                    "./release.MF",
                    "name: uaa\nversion: 1.2.3\ncompiled_packages:\n- name: uaa\n  stemcell: ubuntu-xenial/621.55\n",
                ),
            ],
        );

        let manifest = TarballManifestReader
            .read_release_manifest(&path)
            .expect("manifest");
        assert_eq!(
            manifest,
            ReleaseManifest {
                name: "uaa".to_string(),
                version: "1.2.3".to_string(),
                stemcell: Some(Stemcell::new("ubuntu-xenial", "621.55")),
            }
        );
    }

    #[test]
    fn numeric_versions_become_strings() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("garden.tgz");
        write_tgz(&path, &[("release.MF", "name: garden\nversion: 190\n")]);

        let manifest = TarballManifestReader
            .read_release_manifest(&path)
            .expect("manifest");
        assert_eq!(manifest.version, "190");
        assert_eq!(manifest.stemcell, None);
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("empty.tgz");
        write_tgz(&path, &[("README", "hi")]);

        let err = TarballManifestReader
            .read_release_manifest(&path)
            .unwrap_err();
        assert!(matches!(err, ReleaseError::MissingEntry { entry: "release.MF", .. }));
    }

    #[test]
    fn reads_stemcell_manifest() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("stemcell.tgz");
        write_tgz(
            &path,
            &[("stemcell.MF", "name: bosh-vsphere\noperating_system: ubuntu-jammy\nversion: \"1.18\"\n")],
        );

        assert_eq!(
            read_stemcell_manifest(&path).expect("stemcell"),
            Stemcell::new("ubuntu-jammy", "1.18")
        );
    }
}
