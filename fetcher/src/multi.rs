//! Ordered collection of release sources.
//!
//! Lookups walk the sources in Kilnfile order. Every error raised by an inner
//! source comes back wrapped with that source's ID.

use crate::error::{Result, SourceError};
use crate::source::{ReleaseSource, ReleaseUploader, RemotePathGenerator};
use kiln_release::{Local, Remote, Requirement, parse_lenient};
use std::collections::HashMap;
use std::path::Path;

pub struct MultiReleaseSource {
    sources: Vec<Box<dyn ReleaseSource>>,
}

impl std::fmt::Debug for MultiReleaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiReleaseSource")
            .field("ids", &self.ids())
            .finish()
    }
}

impl MultiReleaseSource {
    /// Fails if two sources share an ID.
    pub fn new(sources: Vec<Box<dyn ReleaseSource>>) -> Result<Self> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (index, source) in sources.iter().enumerate() {
            if let Some(&first) = seen.get(source.id()) {
                return Err(SourceError::DuplicateId {
                    first,
                    second: index,
                    id: source.id().to_string(),
                });
            }
            seen.insert(source.id(), index);
        }
        Ok(Self { sources })
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ReleaseSource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    pub fn find_by_id(&self, id: &str) -> Result<&dyn ReleaseSource> {
        self.iter()
            .find(|source| source.id() == id)
            .ok_or_else(|| SourceError::UnknownSource {
                id: id.to_string(),
                available: self.ids(),
            })
    }

    fn upload_capable_ids(&self) -> Vec<String> {
        self.iter()
            .filter(|source| source.as_uploader().is_some())
            .map(|source| source.id().to_string())
            .collect()
    }

    /// The uploader for source `id`, listing the alternatives if there is no
    /// such source or it can't accept uploads.
    pub fn find_uploader(&self, id: &str) -> Result<&dyn ReleaseUploader> {
        let available = self.upload_capable_ids();
        if available.is_empty() {
            return Err(SourceError::NoUploadSources);
        }
        self.iter()
            .find(|source| source.id() == id)
            .and_then(|source| source.as_uploader())
            .ok_or_else(|| SourceError::UploadUnsupported {
                id: id.to_string(),
                available,
            })
    }

    pub fn find_path_generator(&self, id: &str) -> Result<&dyn RemotePathGenerator> {
        self.find_by_id(id)?
            .as_path_generator()
            .ok_or_else(|| SourceError::RemotePathUnsupported { id: id.to_string() })
    }

    /// First source, in order, with an exact match.
    pub async fn get_matched_release(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        for source in self.iter() {
            let found = source
                .get_matched_release(requirement)
                .await
                .map_err(|e| e.scoped(source.id()))?;
            if let Some(remote) = found {
                tracing::debug!(release = %requirement.name, source_id = %source.id(), "matched release");
                return Ok(Some(remote));
            }
        }
        Ok(None)
    }

    /// Highest version any source offers. On equal versions the earlier
    /// source wins.
    pub async fn find_release_version(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        let mut best: Option<Remote> = None;
        for source in self.iter() {
            let found = source
                .find_release_version(requirement)
                .await
                .map_err(|e| e.scoped(source.id()))?;
            let Some(candidate) = found else {
                continue;
            };
            let replace = match &best {
                None => true,
                Some(current) => match (
                    parse_lenient(&candidate.id.version),
                    parse_lenient(&current.id.version),
                ) {
                    (Some(new), Some(old)) => new > old,
                    (Some(_), None) => true,
                    _ => false,
                },
            };
            if replace {
                best = Some(candidate);
            }
        }
        Ok(best)
    }

    /// Route to the source named by `remote.source_id`.
    pub async fn download_release(
        &self,
        dir: &Path,
        remote: &Remote,
        download_threads: usize,
    ) -> Result<Local> {
        let source = self.find_by_id(&remote.source_id)?;
        source
            .download_release(dir, remote, download_threads)
            .await
            .map_err(|e| e.scoped(source.id()))
    }
}
