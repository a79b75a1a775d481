//! Object-storage source whose keys are recognised by a regular expression.
//!
//! The expression names its captures:
//! - compiled artifacts: `release_name`, `release_version`, `stemcell_os`,
//!   `stemcell_version`
//! - built artifacts: `release_name`, `release_version` only
//!
//! The bucket is listed once per source instance; the resulting index
//! answers every lookup after that.

use crate::error::{Result, SourceError};
use crate::object_store::{ObjectStore, download_to_dir};
use crate::source::ReleaseSource;
use async_trait::async_trait;
use kiln_release::{Local, ReleaseId, Remote, Requirement, VersionConstraint, select_highest};
use regex_lite::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;

const RELEASE_NAME: &str = "release_name";
const RELEASE_VERSION: &str = "release_version";
const STEMCELL_OS: &str = "stemcell_os";
const STEMCELL_VERSION: &str = "stemcell_version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Compiled against one stemcell; matched on all four fields.
    Compiled,
    /// Platform-agnostic; matched on name and version.
    Built,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexKey {
    name: String,
    version: String,
    stemcell_os: String,
    stemcell_version: String,
}

pub struct RegexReleaseSource {
    id: String,
    bucket: String,
    publishable: bool,
    pattern: Regex,
    kind: ArtifactKind,
    store: Arc<dyn ObjectStore>,
    index: OnceCell<HashMap<IndexKey, String>>,
}

impl std::fmt::Debug for RegexReleaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegexReleaseSource")
            .field("id", &self.id)
            .field("bucket", &self.bucket)
            .field("pattern", &self.pattern.as_str())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl RegexReleaseSource {
    /// Compile and validate `pattern`. Fails before any I/O if the capture
    /// groups are neither the compiled set nor the built set.
    pub fn new(
        id: impl Into<String>,
        bucket: impl Into<String>,
        pattern: &str,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        let id = id.into();
        let regex = Regex::new(pattern).map_err(|e| SourceError::InvalidRegex {
            source_id: id.clone(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let names: BTreeSet<&str> = regex.capture_names().flatten().collect();
        let compiled: BTreeSet<&str> =
            [RELEASE_NAME, RELEASE_VERSION, STEMCELL_OS, STEMCELL_VERSION].into();
        let built: BTreeSet<&str> = [RELEASE_NAME, RELEASE_VERSION].into();
        let kind = if names == compiled {
            ArtifactKind::Compiled
        } else if names == built {
            ArtifactKind::Built
        } else {
            return Err(SourceError::MissingCaptureGroups {
                source_id: id,
                required: format!(
                    "{RELEASE_NAME}, {RELEASE_VERSION}, {STEMCELL_OS}, {STEMCELL_VERSION} (or only {RELEASE_NAME}, {RELEASE_VERSION} for built releases)"
                ),
            });
        };

        Ok(Self {
            id,
            bucket: bucket.into(),
            publishable: false,
            pattern: regex,
            kind,
            store,
            index: OnceCell::new(),
        })
    }

    pub fn with_publishable(mut self, publishable: bool) -> Self {
        self.publishable = publishable;
        self
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// The identity a key encodes, if it matches and every group captured
    /// something.
    fn parse_key(&self, key: &str) -> Option<IndexKey> {
        let captures = self.pattern.captures(key)?;
        let field = |name: &str| {
            captures
                .name(name)
                .map(|m| m.as_str())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let (stemcell_os, stemcell_version) = match self.kind {
            ArtifactKind::Compiled => (field(STEMCELL_OS)?, field(STEMCELL_VERSION)?),
            ArtifactKind::Built => (String::new(), String::new()),
        };
        Some(IndexKey {
            name: field(RELEASE_NAME)?,
            version: field(RELEASE_VERSION)?,
            stemcell_os,
            stemcell_version,
        })
    }

    async fn index(&self) -> Result<&HashMap<IndexKey, String>> {
        self.index
            .get_or_try_init(|| async {
                let mut keys = self.store.list_keys(&self.bucket, "").await?;
                keys.sort();
                let mut index = HashMap::new();
                for key in keys {
                    if let Some(parsed) = self.parse_key(&key) {
                        index.entry(parsed).or_insert(key);
                    }
                }
                tracing::debug!(source_id = %self.id, bucket = %self.bucket, releases = index.len(), "indexed bucket");
                Ok::<_, SourceError>(index)
            })
            .await
    }

    fn lookup_key(&self, requirement: &Requirement) -> IndexKey {
        let (stemcell_os, stemcell_version) = match self.kind {
            ArtifactKind::Compiled => (
                requirement.stemcell_os.clone(),
                requirement.stemcell_version.clone(),
            ),
            ArtifactKind::Built => (String::new(), String::new()),
        };
        IndexKey {
            name: requirement.name.clone(),
            version: requirement.version.clone(),
            stemcell_os,
            stemcell_version,
        }
    }

    fn remote(&self, key: &IndexKey, remote_path: &str) -> Remote {
        Remote::new(
            ReleaseId::new(&key.name, &key.version),
            remote_path,
            self.id.clone(),
        )
    }
}

#[async_trait]
impl ReleaseSource for RegexReleaseSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn publishable(&self) -> bool {
        self.publishable
    }

    async fn get_matched_release(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        let wanted = self.lookup_key(requirement);
        let index = self.index().await?;
        Ok(index.get(&wanted).map(|path| self.remote(&wanted, path)))
    }

    async fn find_release_version(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        let constraint = VersionConstraint::parse(&requirement.version)?;
        let wanted = self.lookup_key(requirement);
        let index = self.index().await?;

        let mut candidates: Vec<(&IndexKey, &String)> = index
            .iter()
            .filter(|(key, _)| {
                key.name == wanted.name
                    && key.stemcell_os == wanted.stemcell_os
                    && key.stemcell_version == wanted.stemcell_version
            })
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(b.1));

        let best = select_highest(
            &constraint,
            candidates
                .into_iter()
                .map(|(key, path)| (key.version.clone(), (key, path))),
        );
        Ok(best.map(|(_, (key, path))| self.remote(key, path)))
    }

    async fn download_release(
        &self,
        dir: &Path,
        remote: &Remote,
        download_threads: usize,
    ) -> Result<Local> {
        download_to_dir(
            self.store.as_ref(),
            &self.bucket,
            &self.id,
            dir,
            remote,
            download_threads,
        )
        .await
    }
}
