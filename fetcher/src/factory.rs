//! Building release sources from Kilnfile `release_sources` entries.

use crate::bosh_io::BoshIoReleaseSource;
use crate::error::{Result, SourceError};
use crate::multi::MultiReleaseSource;
use crate::object_store::ObjectStore;
use crate::regex_source::RegexReleaseSource;
use crate::s3::{AwsObjectStore, S3Settings};
use crate::source::{ReleaseSource, SOURCE_TYPE_BOSH_IO, SOURCE_TYPE_S3};
use crate::template_source::TemplateReleaseSource;
use kiln_kilnfile::{Kilnfile, ReleaseSourceConfig};
use std::sync::Arc;

type StoreProvider = dyn Fn(&S3Settings) -> Arc<dyn ObjectStore> + Send + Sync;

/// Turns source configs into [`ReleaseSource`]s. No I/O happens here; every
/// configuration error surfaces before the first request.
pub struct SourceFactory {
    store_provider: Box<StoreProvider>,
    bosh_io_url: Option<String>,
}

impl std::fmt::Debug for SourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFactory")
            .field("bosh_io_url", &self.bosh_io_url)
            .finish_non_exhaustive()
    }
}

impl Default for SourceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFactory {
    /// S3 sources talk to AWS (or the configured endpoint).
    pub fn new() -> Self {
        Self {
            store_provider: Box::new(|settings: &S3Settings| {
                Arc::new(AwsObjectStore::new(settings.clone())) as Arc<dyn ObjectStore>
            }),
            bosh_io_url: None,
        }
    }

    /// Every S3 source uses `store`, whatever its credentials say.
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store_provider = Box::new(move |_: &S3Settings| store.clone());
        self
    }

    /// Override the bosh.io server for sources that don't set `endpoint`.
    pub fn with_bosh_io_url(mut self, url: impl Into<String>) -> Self {
        self.bosh_io_url = Some(url.into());
        self
    }

    pub fn build(&self, config: &ReleaseSourceConfig) -> Result<Box<dyn ReleaseSource>> {
        match config.kind.as_str() {
            SOURCE_TYPE_S3 => self.build_s3(config),
            SOURCE_TYPE_BOSH_IO => Ok(Box::new(self.build_bosh_io(config))),
            other => Err(SourceError::UnknownType {
                kind: other.to_string(),
                expected: format!("{SOURCE_TYPE_S3:?}, {SOURCE_TYPE_BOSH_IO:?}"),
            }),
        }
    }

    /// All sources from `kilnfile`, in order. With `allow_only_publishable`
    /// set, sources not marked `publishable` are left out.
    pub fn build_all(
        &self,
        kilnfile: &Kilnfile,
        allow_only_publishable: bool,
    ) -> Result<MultiReleaseSource> {
        let mut sources = Vec::with_capacity(kilnfile.release_sources.len());
        for config in &kilnfile.release_sources {
            if allow_only_publishable && !config.publishable {
                tracing::debug!(source_id = %source_id(config), "skipping non-publishable release source");
                continue;
            }
            sources.push(self.build(config)?);
        }
        MultiReleaseSource::new(sources)
    }

    fn build_s3(&self, config: &ReleaseSourceConfig) -> Result<Box<dyn ReleaseSource>> {
        let id = source_id(config);
        if config.bucket.is_empty() {
            return Err(SourceError::InvalidConfig {
                source_id: id,
                message: "s3 release sources require a bucket".to_string(),
            });
        }

        let store = (self.store_provider)(&S3Settings {
            region: config.region.clone(),
            access_key_id: config.access_key_id.clone(),
            secret_access_key: config.secret_access_key.clone(),
            endpoint: config.endpoint.clone(),
        });

        match (config.path_template.is_empty(), config.regex.is_empty()) {
            (false, true) => Ok(Box::new(
                TemplateReleaseSource::new(id, &config.bucket, &config.path_template, store)?
                    .with_publishable(config.publishable),
            )),
            (true, false) => Ok(Box::new(
                RegexReleaseSource::new(id, &config.bucket, &config.regex, store)?
                    .with_publishable(config.publishable),
            )),
            (false, false) => Err(SourceError::InvalidConfig {
                source_id: id,
                message: "set either path_template or regex, not both".to_string(),
            }),
            (true, true) => Err(SourceError::InvalidConfig {
                source_id: id,
                message: "s3 release sources require a path_template or a regex".to_string(),
            }),
        }
    }

    fn build_bosh_io(&self, config: &ReleaseSourceConfig) -> BoshIoReleaseSource {
        let mut source = BoshIoReleaseSource::new(source_id(config))
            .with_api_token(&config.api_token)
            .with_publishable(config.publishable);
        if !config.endpoint.is_empty() {
            source = source.with_server_url(&config.endpoint);
        } else if let Some(url) = &self.bosh_io_url {
            source = source.with_server_url(url);
        }
        source
    }
}

/// Configured ID, or the default for the source type: the bucket name for
/// S3, `bosh.io` for the public index.
pub fn source_id(config: &ReleaseSourceConfig) -> String {
    if !config.id.is_empty() {
        return config.id.clone();
    }
    match config.kind.as_str() {
        SOURCE_TYPE_BOSH_IO => SOURCE_TYPE_BOSH_IO.to_string(),
        _ => config.bucket.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryObjectStore;
    use pretty_assertions::assert_eq;

    fn s3(id: &str, bucket: &str) -> ReleaseSourceConfig {
        ReleaseSourceConfig {
            kind: SOURCE_TYPE_S3.to_string(),
            id: id.to_string(),
            bucket: bucket.to_string(),
            path_template: "{{.Name}}/{{.Name}}-{{.Version}}.tgz".to_string(),
            ..ReleaseSourceConfig::default()
        }
    }

    fn factory() -> SourceFactory {
        SourceFactory::new().with_object_store(Arc::new(MemoryObjectStore::new()))
    }

    #[test]
    fn ids_default_by_type() {
        assert_eq!(source_id(&s3("", "compiled-bucket")), "compiled-bucket");
        assert_eq!(source_id(&s3("named", "compiled-bucket")), "named");
        let bosh = ReleaseSourceConfig {
            kind: SOURCE_TYPE_BOSH_IO.to_string(),
            ..ReleaseSourceConfig::default()
        };
        assert_eq!(source_id(&bosh), "bosh.io");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let config = ReleaseSourceConfig {
            kind: "artifactory".to_string(),
            ..ReleaseSourceConfig::default()
        };
        let Err(err) = factory().build(&config) else {
            panic!("artifactory is not a known type");
        };
        assert!(matches!(err, SourceError::UnknownType { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn s3_requires_exactly_one_matcher() {
        let mut both = s3("x", "bucket");
        both.regex = "(?P<release_name>.*)-(?P<release_version>.*)".to_string();
        assert!(factory().build(&both).is_err());

        let mut neither = s3("x", "bucket");
        neither.path_template.clear();
        assert!(factory().build(&neither).is_err());

        let mut no_bucket = s3("x", "");
        no_bucket.bucket.clear();
        assert!(factory().build(&no_bucket).is_err());
    }

    #[test]
    fn publishable_filter_and_capabilities() {
        let mut publishable = s3("published", "bucket-a");
        publishable.publishable = true;
        let kilnfile = Kilnfile {
            release_sources: vec![
                publishable,
                s3("scratch", "bucket-b"),
                ReleaseSourceConfig {
                    kind: SOURCE_TYPE_BOSH_IO.to_string(),
                    ..ReleaseSourceConfig::default()
                },
            ],
            ..Kilnfile::default()
        };

        let all = factory().build_all(&kilnfile, false).expect("all");
        assert_eq!(all.ids(), vec!["published", "scratch", "bosh.io"]);
        assert!(all.find_by_id("bosh.io").expect("bosh.io").as_uploader().is_none());
        assert!(all.find_path_generator("scratch").is_ok());

        let only = factory().build_all(&kilnfile, true).expect("publishable");
        assert_eq!(only.ids(), vec!["published"]);
    }

    #[test]
    fn duplicate_ids_surface_from_kilnfile() {
        let kilnfile = Kilnfile {
            release_sources: vec![s3("", "same"), s3("same", "other")],
            ..Kilnfile::default()
        };
        let err = factory().build_all(&kilnfile, false).unwrap_err();
        assert!(matches!(err, SourceError::DuplicateId { first: 0, second: 1, .. }));
    }
}
