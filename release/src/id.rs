//! Release value types.

use kiln_kilnfile::{ReleaseLock, Stemcell};
use std::fmt;
use std::path::PathBuf;

/// Identity of a release. Versions are opaque strings compared exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseId {
    pub name: String,
    pub version: String,
}

impl ReleaseId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// What a caller wants: a release name, a version (exact or a constraint,
/// interpreted by the operation), and the stemcell it must run on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub name: String,
    pub version: String,
    pub stemcell_os: String,
    pub stemcell_version: String,
}

impl Requirement {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn with_stemcell(mut self, stemcell: &Stemcell) -> Self {
        self.stemcell_os = stemcell.os.clone();
        self.stemcell_version = stemcell.version.clone();
        self
    }

    /// Requirement pinned to exactly what a lock entry records.
    pub fn from_lock(lock: &ReleaseLock, stemcell: &Stemcell) -> Self {
        Self::new(&lock.name, &lock.version).with_stemcell(stemcell)
    }

    pub fn id(&self) -> ReleaseId {
        ReleaseId::new(&self.name, &self.version)
    }

    pub fn stemcell(&self) -> Stemcell {
        Stemcell::new(&self.stemcell_os, &self.stemcell_version)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)?;
        } else {
            write!(f, "{} {}", self.name, self.version)?;
        }
        if !self.stemcell_os.is_empty() || !self.stemcell_version.is_empty() {
            write!(f, " (stemcell {}/{})", self.stemcell_os, self.stemcell_version)?;
        }
        Ok(())
    }
}

/// A located artifact. Nothing has been transferred yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Remote {
    pub id: ReleaseId,
    /// Backend-specific key or URL needed to fetch the artifact.
    pub remote_path: String,
    /// ID of the source that produced this match.
    pub source_id: String,
    /// Checksum, when the backend publishes one.
    pub sha1: Option<String>,
}

impl Remote {
    pub fn new(id: ReleaseId, remote_path: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id,
            remote_path: remote_path.into(),
            source_id: source_id.into(),
            sha1: None,
        }
    }

    pub fn with_sha1(mut self, sha1: impl Into<String>) -> Self {
        self.sha1 = Some(sha1.into());
        self
    }

    /// The location a lock entry already points at.
    pub fn from_lock(lock: &ReleaseLock) -> Self {
        let remote = Self::new(
            ReleaseId::new(&lock.name, &lock.version),
            &lock.remote_path,
            &lock.remote_source,
        );
        if lock.sha1.is_empty() {
            remote
        } else {
            remote.with_sha1(&lock.sha1)
        }
    }
}

/// A downloaded artifact and its verified checksum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Local {
    pub id: ReleaseId,
    pub local_path: PathBuf,
    pub sha1: String,
}

impl Local {
    pub fn new(id: ReleaseId, local_path: impl Into<PathBuf>, sha1: impl Into<String>) -> Self {
        Self {
            id,
            local_path: local_path.into(),
            sha1: sha1.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn requirement_from_lock_uses_lock_stemcell() {
        let lock = ReleaseLock {
            name: "uaa".to_string(),
            version: "1.2.3".to_string(),
            ..ReleaseLock::default()
        };
        let requirement = Requirement::from_lock(&lock, &Stemcell::new("ubuntu-xenial", "621.55"));

        assert_eq!(requirement.id(), ReleaseId::new("uaa", "1.2.3"));
        assert_eq!(requirement.stemcell(), Stemcell::new("ubuntu-xenial", "621.55"));
        assert_eq!(requirement.to_string(), "uaa 1.2.3 (stemcell ubuntu-xenial/621.55)");
    }

    #[test]
    fn remote_from_lock_keeps_location_and_checksum() {
        let lock = ReleaseLock {
            name: "bpm".to_string(),
            version: "1.1.9".to_string(),
            sha1: "abc".to_string(),
            remote_source: "bosh.io".to_string(),
            remote_path: "https://bosh.io/d/bpm".to_string(),
        };
        let remote = Remote::from_lock(&lock);

        assert_eq!(remote.source_id, "bosh.io");
        assert_eq!(remote.remote_path, "https://bosh.io/d/bpm");
        assert_eq!(remote.sha1.as_deref(), Some("abc"));

        let unhashed = Remote::from_lock(&ReleaseLock {
            sha1: String::new(),
            ..lock
        });
        assert_eq!(unhashed.sha1, None);
    }
}
