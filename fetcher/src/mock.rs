//! In-memory fakes for tests.

#![allow(clippy::unwrap_used)] // Mock code: panicking on a poisoned lock is acceptable in tests

use crate::error::{ObjectStoreError, Result, SourceError};
use crate::object_store::{ObjectStore, StoreResult};
use crate::source::{ReleaseSource, download_destination, finish_download};
use async_trait::async_trait;
use kiln_release::{Local, Remote, Requirement, VersionConstraint, select_highest};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Buckets held in memory. Counts every call so tests can assert that no
/// network traffic would have happened.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Make every following call fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// `"<op> <bucket>/<key>"` for every call made so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str, bucket: &str, key: &str) -> StoreResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{operation} {bucket}/{key}"));
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(ObjectStoreError::Request {
                operation,
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        self.record("LIST", bucket, prefix)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        self.record("HEAD", bucket, key)?;
        Ok(self.get(bucket, key).is_some())
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        _concurrency: usize,
    ) -> StoreResult<()> {
        self.record("GET", bucket, key)?;
        let body = self.get(bucket, key).ok_or_else(|| ObjectStoreError::Request {
            operation: "GET",
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: "NoSuchKey".to_string(),
        })?;
        std::fs::write(dest, body).map_err(|source| ObjectStoreError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }

    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<()> {
        self.record("PUT", bucket, key)?;
        let body = std::fs::read(source).map_err(|source_err| ObjectStoreError::Io {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        self.insert(bucket, key, body);
        Ok(())
    }
}

/// Shared view of a [`FakeReleaseSource`]'s calls; stays readable after the
/// source is boxed into an aggregator.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }
}

/// A release source that serves canned releases from memory.
///
/// Each release is a `(requirement, body)` pair; the requirement's stemcell
/// fields must match exactly unless left empty (a built release).
#[derive(Debug, Default)]
pub struct FakeReleaseSource {
    id: String,
    publishable: bool,
    releases: Vec<(Requirement, Vec<u8>)>,
    calls: CallLog,
    failure: Option<String>,
}

impl FakeReleaseSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn publishable(mut self, publishable: bool) -> Self {
        self.publishable = publishable;
        self
    }

    pub fn with_release(mut self, requirement: Requirement, body: impl Into<Vec<u8>>) -> Self {
        self.releases.push((requirement, body.into()));
        self
    }

    /// Fail every lookup and download with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// `"<op> <name>@<version>"` for every call made so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.entries()
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    pub fn remote_path_for(requirement: &Requirement) -> String {
        let Requirement {
            name,
            version,
            stemcell_os,
            stemcell_version,
        } = requirement;
        if stemcell_os.is_empty() {
            format!("{name}/{name}-{version}.tgz")
        } else {
            format!("{name}/{name}-{version}-{stemcell_os}-{stemcell_version}.tgz")
        }
    }

    fn record(&self, operation: &str, name: &str, version: &str) -> Result<()> {
        self.calls.push(format!("{operation} {name}@{version}"));
        match &self.failure {
            Some(message) => Err(SourceError::InvalidConfig {
                source_id: self.id.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn stemcell_matches(candidate: &Requirement, wanted: &Requirement) -> bool {
        (candidate.stemcell_os.is_empty() && candidate.stemcell_version.is_empty())
            || (candidate.stemcell_os == wanted.stemcell_os
                && candidate.stemcell_version == wanted.stemcell_version)
    }

    fn remote(&self, requirement: &Requirement) -> Remote {
        Remote::new(
            requirement.id(),
            Self::remote_path_for(requirement),
            self.id.clone(),
        )
    }
}

#[async_trait]
impl ReleaseSource for FakeReleaseSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn publishable(&self) -> bool {
        self.publishable
    }

    async fn get_matched_release(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        self.record("match", &requirement.name, &requirement.version)?;
        Ok(self
            .releases
            .iter()
            .find(|(candidate, _)| {
                candidate.name == requirement.name
                    && candidate.version == requirement.version
                    && Self::stemcell_matches(candidate, requirement)
            })
            .map(|(candidate, _)| self.remote(candidate)))
    }

    async fn find_release_version(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        self.record("find", &requirement.name, &requirement.version)?;
        let constraint = VersionConstraint::parse(&requirement.version)?;
        let candidates = self
            .releases
            .iter()
            .filter(|(candidate, _)| {
                candidate.name == requirement.name && Self::stemcell_matches(candidate, requirement)
            })
            .map(|(candidate, _)| (candidate.version.clone(), candidate));
        Ok(select_highest(&constraint, candidates).map(|(_, candidate)| self.remote(candidate)))
    }

    async fn download_release(
        &self,
        dir: &Path,
        remote: &Remote,
        _download_threads: usize,
    ) -> Result<Local> {
        self.record("download", &remote.id.name, &remote.id.version)?;
        let body = self
            .releases
            .iter()
            .find(|(candidate, _)| Self::remote_path_for(candidate) == remote.remote_path)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| SourceError::InvalidConfig {
                source_id: self.id.clone(),
                message: format!("no such remote path {:?}", remote.remote_path),
            })?;
        let path = download_destination(dir, remote);
        std::fs::write(&path, body).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        finish_download(path, remote)
    }
}
