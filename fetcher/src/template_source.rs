//! Object-storage source whose keys are computed from a path template.
//!
//! Exact lookups render the template and issue a single existence check.
//! Version discovery renders the template with a placeholder version, lists
//! only the literal prefix before it, and recovers versions from the keys.

use crate::error::{Result, SourceError};
use crate::object_store::{ObjectStore, download_to_dir};
use crate::source::{ReleaseSource, ReleaseUploader, RemotePathGenerator};
use crate::template::{PathTemplate, TemplateFields};
use async_trait::async_trait;
use kiln_release::{
    Local, ReleaseId, Remote, Requirement, VersionConstraint, select_highest, sha1_file,
};
use regex_lite::Regex;
use std::path::Path;
use std::sync::Arc;

const VERSION_PLACEHOLDER: &str = "KILNVERSIONPLACEHOLDER";

pub struct TemplateReleaseSource {
    id: String,
    bucket: String,
    publishable: bool,
    template: PathTemplate,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for TemplateReleaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateReleaseSource")
            .field("id", &self.id)
            .field("bucket", &self.bucket)
            .field("template", &self.template.as_str())
            .finish_non_exhaustive()
    }
}

impl TemplateReleaseSource {
    pub fn new(
        id: impl Into<String>,
        bucket: impl Into<String>,
        path_template: &str,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        let id = id.into();
        let template = PathTemplate::parse(path_template).map_err(|e| SourceError::InvalidTemplate {
            source_id: id.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            id,
            bucket: bucket.into(),
            publishable: false,
            template,
            store,
        })
    }

    pub fn with_publishable(mut self, publishable: bool) -> Self {
        self.publishable = publishable;
        self
    }

    fn render(&self, fields: &TemplateFields) -> Result<String> {
        self.template
            .render(fields)
            .map_err(|e| SourceError::TemplateRender {
                source_id: self.id.clone(),
                release: format!("{} {}", fields.name, fields.version),
                message: e.to_string(),
            })
    }

    fn remote(&self, requirement: &Requirement, version: &str, key: String) -> Remote {
        Remote::new(
            ReleaseId::new(&requirement.name, version),
            key,
            self.id.clone(),
        )
    }

    /// Key pattern with the version as capture group 1, and the literal
    /// prefix that precedes the first version reference.
    fn version_pattern(&self, requirement: &Requirement) -> Result<(Regex, String)> {
        let mut fields = TemplateFields::from(requirement);
        fields.version = VERSION_PLACEHOLDER.to_string();
        let rendered = self.render(&fields)?;

        let Some(position) = rendered.find(VERSION_PLACEHOLDER) else {
            return Err(SourceError::InvalidConfig {
                source_id: self.id.clone(),
                message: format!(
                    "path_template {:?} does not reference Version; cannot search for versions",
                    self.template.as_str()
                ),
            });
        };
        let prefix = rendered[..position].to_string();

        let pattern = format!(
            "^{}$",
            regex_lite::escape(&rendered).replace(VERSION_PLACEHOLDER, "([^/]+?)")
        );
        let regex = Regex::new(&pattern).map_err(|e| SourceError::InvalidTemplate {
            source_id: self.id.clone(),
            message: e.to_string(),
        })?;
        Ok((regex, prefix))
    }
}

#[async_trait]
impl ReleaseSource for TemplateReleaseSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn publishable(&self) -> bool {
        self.publishable
    }

    async fn get_matched_release(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        let key = self.render(&TemplateFields::from(requirement))?;
        if !self.store.object_exists(&self.bucket, &key).await? {
            tracing::debug!(source_id = %self.id, key = %key, "no object at rendered key");
            return Ok(None);
        }
        Ok(Some(self.remote(requirement, &requirement.version, key)))
    }

    async fn find_release_version(&self, requirement: &Requirement) -> Result<Option<Remote>> {
        let constraint = VersionConstraint::parse(&requirement.version)?;
        let (pattern, prefix) = self.version_pattern(requirement)?;

        let mut keys = self.store.list_keys(&self.bucket, &prefix).await?;
        keys.sort();

        let mut candidates = Vec::new();
        for key in keys {
            let Some(version) = pattern
                .captures(&key)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string())
            else {
                continue;
            };
            // A lazy capture can split a key the template would never
            // produce; confirm by rendering it back.
            let mut fields = TemplateFields::from(requirement);
            fields.version = version.clone();
            if self.render(&fields)? == key {
                candidates.push((version, key));
            }
        }

        Ok(select_highest(&constraint, candidates)
            .map(|(version, key)| self.remote(requirement, &version, key)))
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

    fn as_uploader(&self) -> Option<&dyn ReleaseUploader> {
        Some(self)
    }

    fn as_path_generator(&self) -> Option<&dyn RemotePathGenerator> {
        Some(self)
    }
}

#[async_trait]
impl ReleaseUploader for TemplateReleaseSource {
    async fn upload_release(&self, requirement: &Requirement, archive: &Path) -> Result<Remote> {
        let key = self.render(&TemplateFields::from(requirement))?;
        let sha1 = sha1_file(archive)?;
        self.store.upload(&self.bucket, &key, archive).await?;
        tracing::info!(
            release = %requirement.name,
            version = %requirement.version,
            source_id = %self.id,
            key = %key,
            "uploaded release"
        );
        Ok(self.remote(requirement, &requirement.version, key).with_sha1(sha1))
    }
}

impl RemotePathGenerator for TemplateReleaseSource {
    fn remote_path(&self, requirement: &Requirement) -> Result<String> {
        self.render(&TemplateFields::from(requirement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryObjectStore;
    use kiln_kilnfile::Stemcell;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TEMPLATE: &str =
        "2.11/{{trimSuffix .Name \"-release\"}}/{{.Name}}-{{.Version}}-{{.StemcellOS}}-{{.StemcellVersion}}.tgz";

    fn xenial(name: &str, version: &str) -> Requirement {
        Requirement::new(name, version).with_stemcell(&Stemcell::new("ubuntu-xenial", "621.55"))
    }

    fn source(store: Arc<MemoryObjectStore>) -> TemplateReleaseSource {
        TemplateReleaseSource::new("compiled-releases", "compiled", TEMPLATE, store)
            .expect("source")
    }

    #[tokio::test]
    async fn matches_with_a_single_existence_check() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(
            "compiled",
            "2.11/uaa/uaa-release-1.2.3-ubuntu-xenial-621.55.tgz",
            "uaa",
        );
        let source = source(store.clone());

        let remote = source
            .get_matched_release(&xenial("uaa-release", "1.2.3"))
            .await
            .expect("match")
            .expect("found");
        assert_eq!(remote.remote_path, "2.11/uaa/uaa-release-1.2.3-ubuntu-xenial-621.55.tgz");
        assert_eq!(
            store.calls(),
            vec!["HEAD compiled/2.11/uaa/uaa-release-1.2.3-ubuntu-xenial-621.55.tgz".to_string()]
        );

        let absent = source
            .get_matched_release(&xenial("uaa-release", "9.9.9"))
            .await
            .expect("match");
        assert_eq!(absent, None);
    }

    #[tokio::test]
    async fn backend_errors_are_not_treated_as_absent() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_with("AccessDenied");
        let err = source(store)
            .get_matched_release(&xenial("uaa", "1.2.3"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Store(_)));
    }

    #[test]
    fn unknown_field_surfaces_as_configuration_error() {
        let source = TemplateReleaseSource::new(
            "broken",
            "bucket",
            "{{.Nmae}}.tgz",
            Arc::new(MemoryObjectStore::new()),
        )
        .expect("parses");
        let err = source.remote_path(&xenial("uaa", "1.2.3")).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("unable to evaluate path_template"));
    }

    #[tokio::test]
    async fn finds_highest_version_under_literal_prefix() {
        let store = Arc::new(MemoryObjectStore::new());
        for key in [
            "2.11/bpm/bpm-1.1.0-ubuntu-xenial-621.55.tgz",
            "2.11/bpm/bpm-1.1.9-ubuntu-xenial-621.55.tgz",
            "2.11/bpm/bpm-1.2.0-ubuntu-xenial-621.55.tgz",
            "2.11/bpm/bpm-1.1.12-ubuntu-jammy-1.18.tgz",
            "2.12/bpm/bpm-1.1.99-ubuntu-xenial-621.55.tgz",
        ] {
            store.insert("compiled", key, "x");
        }
        let source = source(store.clone());

        let remote = source
            .find_release_version(&xenial("bpm", "~1.1"))
            .await
            .expect("find")
            .expect("found");
        assert_eq!(remote.id.version, "1.1.9");
        assert_eq!(remote.remote_path, "2.11/bpm/bpm-1.1.9-ubuntu-xenial-621.55.tgz");
        assert_eq!(store.calls(), vec!["LIST compiled/2.11/bpm/bpm-".to_string()]);
    }

    #[tokio::test]
    async fn uploads_to_rendered_key() {
        let dir = TempDir::new().expect("temp dir");
        let archive = dir.path().join("bpm.tgz");
        std::fs::write(&archive, "hello world").expect("write");
        let store = Arc::new(MemoryObjectStore::new());
        let source = source(store.clone());

        let uploader = source.as_uploader().expect("upload capable");
        let remote = uploader
            .upload_release(&xenial("bpm", "1.1.9"), &archive)
            .await
            .expect("upload");

        assert_eq!(remote.remote_path, "2.11/bpm/bpm-1.1.9-ubuntu-xenial-621.55.tgz");
        assert_eq!(
            remote.sha1.as_deref(),
            Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed")
        );
        assert_eq!(
            store.get("compiled", &remote.remote_path),
            Some(b"hello world".to_vec())
        );
    }
}
