//! Release source backed by the public bosh.io index.
//!
//! bosh.io names releases after their GitHub repository, so a release name
//! is searched across a fixed set of organisations and repository suffixes;
//! the first repository bosh.io knows about wins.

use crate::error::{Result, SourceError};
use crate::source::{
    ReleaseSource, commit_download, finish_download, partial_destination, remove_partial,
};
use async_trait::async_trait;
use futures::StreamExt;
use kiln_release::{Local, ReleaseId, Remote, Requirement, VersionConstraint, select_highest};
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

pub const DEFAULT_BOSH_IO_URL: &str = "https://bosh.io";

const ORGANIZATIONS: &[&str] = &[
    "cloudfoundry",
    "pivotal-cf",
    "cloudfoundry-incubator",
    "pivotal-cf-experimental",
    "bosh-packages",
    "cppforlife",
    "vito",
    "flavorjones",
    "xoebus",
    "dpb587",
    "jamlo",
    "concourse",
    "cf-platform-eng",
    "starkandwayne",
    "cloudfoundry-community",
    "vmware",
    "DataDog",
    "Dynatrace",
    "SAP",
    "hybris",
    "minio",
    "rakutentech",
    "frodenas",
];

const NAME_SUFFIXES: &[&str] = &["-release", "-boshrelease", "-bosh-release", ""];

#[derive(Debug, Deserialize)]
struct PublishedVersion {
    version: String,
    #[serde(default)]
    sha1: String,
}

#[derive(Debug, Clone)]
pub struct BoshIoReleaseSource {
    id: String,
    publishable: bool,
    server_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl BoshIoReleaseSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            publishable: false,
            server_url: DEFAULT_BOSH_IO_URL.to_string(),
            api_token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Talk to a different server (a mirror, or a test double).
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.api_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn with_publishable(mut self, publishable: bool) -> Self {
        self.publishable = publishable;
        self
    }

    /// `org/repo` candidates for a release name, in search order.
    fn repositories(name: &str) -> impl Iterator<Item = String> + '_ {
        ORGANIZATIONS.iter().flat_map(move |org| {
            NAME_SUFFIXES
                .iter()
                .map(move |suffix| format!("{org}/{name}{suffix}"))
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Versions bosh.io has for `repository`; `None` if it doesn't know the
    /// repository at all.
    async fn published_versions(&self, repository: &str) -> Result<Option<Vec<PublishedVersion>>> {
        let url = format!("{}/api/v1/releases/github.com/{repository}", self.server_url);
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|source| SourceError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| SourceError::Http {
            url: url.clone(),
            source,
        })?;
        let versions: Option<Vec<PublishedVersion>> =
            serde_json::from_str(&body).map_err(|source| SourceError::Decode { url, source })?;
        Ok(versions)
    }

    fn remote(&self, name: &str, repository: &str, published: &PublishedVersion) -> Remote {
        let url = format!(
            "{}/d/github.com/{repository}?v={}",
            self.server_url, published.version
        );
        let remote = Remote::new(ReleaseId::new(name, &published.version), url, self.id.clone());
        if published.sha1.is_empty() {
            remote
        } else {
            remote.with_sha1(&published.sha1)
        }
    }

    async fn write_body(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Http {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(SourceError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let io_err = |source| SourceError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| SourceError::Http {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl ReleaseSource for BoshIoReleaseSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn publishable(&self) -> bool {
        self.publishable
    }

    /// bosh.io only serves built releases; the stemcell is ignored.
    async fn get_matched_release(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        for repository in Self::repositories(&requirement.name) {
            let Some(versions) = self.published_versions(&repository).await? else {
                continue;
            };
            if let Some(published) = versions.iter().find(|v| v.version == requirement.version) {
                tracing::debug!(release = %requirement.name, repository = %repository, "found release on bosh.io");
                return Ok(Some(self.remote(&requirement.name, &repository, published)));
            }
        }
        Ok(None)
    }

    async fn find_release_version(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        let constraint = VersionConstraint::parse(&requirement.version)?;
        for repository in Self::repositories(&requirement.name) {
            let Some(versions) = self.published_versions(&repository).await? else {
                continue;
            };
            let best = select_highest(
                &constraint,
                versions.iter().map(|published| (published.version.clone(), published)),
            );
            if let Some((_, published)) = best {
                return Ok(Some(self.remote(&requirement.name, &repository, published)));
            }
        }
        Ok(None)
    }

    async fn download_release(
        &self,
        dir: &Path,
        remote: &Remote,
        _download_threads: usize,
    ) -> Result<Local> {
        let dest = dir.join(format!("{}-{}.tgz", remote.id.name, remote.id.version));
        let partial = partial_destination(&dest);
        tracing::info!(release = %remote.id.name, source_id = %self.id, url = %remote.remote_path, "downloading release from bosh.io");
        if let Err(err) = self.write_body(&remote.remote_path, &partial).await {
            remove_partial(&partial);
            return Err(err);
        }
        commit_download(&partial, &dest)?;
        finish_download(dest, remote)
    }
}
