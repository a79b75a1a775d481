//! The Kilnfile: release-source configuration and release declarations.

use crate::error::{KilnfileError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root of a Kilnfile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kilnfile {
    /// Ordered list of release sources; earlier sources win ties.
    #[serde(default)]
    pub release_sources: Vec<ReleaseSourceConfig>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,

    /// Releases the tile needs, each with a version constraint.
    #[serde(default)]
    pub releases: Vec<ReleaseSpec>,

    /// Stemcell OS plus a version constraint.
    #[serde(default, rename = "stemcell_criteria")]
    pub stemcell: Stemcell,
}

impl Kilnfile {
    /// Look up a release declaration by name.
    pub fn release_spec(&self, name: &str) -> Option<&ReleaseSpec> {
        self.releases.iter().find(|r| r.name == name)
    }
}

/// A `{name, version}` release declaration.
///
/// `version` is a constraint (exact string or semver range); empty means any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSpec {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Configuration for one release source.
///
/// The `type` discriminator selects the backend. Which of the remaining fields
/// are required depends on the backend and is validated when the source is
/// constructed, never here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSourceConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default)]
    pub publishable: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_key_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_access_key: String,

    /// S3-compatible endpoint override (forces path-style addressing)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_template: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_token: String,
}

/// Stemcell OS and version.
///
/// In a Kilnfile `version` is a constraint; in a Kilnfile.lock it is exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stemcell {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub version: String,
}

impl Stemcell {
    pub fn new(os: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            version: version.into(),
        }
    }
}

/// Read and parse a Kilnfile.
pub fn load_kilnfile(path: &Path) -> Result<Kilnfile> {
    let text = std::fs::read_to_string(path).map_err(|source| KilnfileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let kilnfile: Kilnfile = serde_yaml::from_str(&text).map_err(|e| KilnfileError::Parse {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;

    tracing::debug!(
        path = %path.display(),
        sources = kilnfile.release_sources.len(),
        releases = kilnfile.releases.len(),
        "loaded Kilnfile"
    );

    Ok(kilnfile)
}
