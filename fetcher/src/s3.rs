//! [`ObjectStore`] backed by the AWS SDK.
//!
//! The client is built lazily on first use so that constructing sources from
//! a Kilnfile never touches the network or the credential chain.

use crate::error::ObjectStoreError;
use crate::object_store::{ObjectStore, StoreResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{AggregatedBytes, ByteStream};
use futures::StreamExt;
use futures::stream;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

const PART_SIZE: u64 = 8 * 1024 * 1024;
const DEFAULT_CONCURRENCY: usize = 5;

/// Connection settings from a Kilnfile source entry.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub region: String,
    /// Empty means use the default AWS credential chain.
    pub access_key_id: String,
    pub secret_access_key: String,
    /// S3-compatible endpoint; forces path-style addressing.
    pub endpoint: String,
}

pub struct AwsObjectStore {
    settings: S3Settings,
    client: OnceCell<Client>,
}

impl std::fmt::Debug for AwsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsObjectStore")
            .field("region", &self.settings.region)
            .field("endpoint", &self.settings.endpoint)
            .finish_non_exhaustive()
    }
}

impl AwsObjectStore {
    pub fn new(settings: S3Settings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            settings: S3Settings::default(),
            client: OnceCell::new_with(Some(client)),
        }
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| build_client(&self.settings))
            .await
    }
}

async fn build_client(settings: &S3Settings) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if !settings.region.is_empty() {
        loader = loader.region(Region::new(settings.region.clone()));
    }
    if !settings.access_key_id.is_empty() {
        loader = loader.credentials_provider(Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "kilnfile",
        ));
    }
    let shared = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared);
    if !settings.endpoint.is_empty() {
        builder = builder
            .endpoint_url(settings.endpoint.clone())
            .force_path_style(true);
    }
    tracing::debug!(region = %settings.region, endpoint = %settings.endpoint, "built S3 client");
    Client::from_conf(builder.build())
}

fn request_error(
    operation: &'static str,
    bucket: &str,
    key: &str,
    err: impl std::error::Error + 'static,
) -> ObjectStoreError {
    ObjectStoreError::Request {
        operation,
        bucket: bucket.to_string(),
        key: key.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
}

/// Object length from a HEAD response. Missing or negative is an error.
fn object_size(bucket: &str, key: &str, content_length: Option<i64>) -> StoreResult<u64> {
    let invalid = |message: String| ObjectStoreError::Request {
        operation: "HEAD",
        bucket: bucket.to_string(),
        key: key.to_string(),
        message,
    };
    let length = content_length.ok_or_else(|| invalid("missing Content-Length".to_string()))?;
    u64::try_from(length).map_err(|_| invalid(format!("invalid Content-Length {length}")))
}

/// Inclusive byte ranges covering `size` bytes.
fn part_ranges(size: u64) -> Vec<(u64, u64)> {
    (0..size)
        .step_by(PART_SIZE as usize)
        .map(|start| (start, (start + PART_SIZE).min(size) - 1))
        .collect()
}

async fn fetch_range(
    client: &Client,
    bucket: &str,
    key: &str,
    (start, end): (u64, u64),
) -> StoreResult<AggregatedBytes> {
    let output = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .range(format!("bytes={start}-{end}"))
        .send()
        .await
        .map_err(|e| request_error("GET", bucket, key, e))?;
    output
        .body
        .collect()
        .await
        .map_err(|e| request_error("GET", bucket, key, e))
}

#[async_trait]
impl ObjectStore for AwsObjectStore {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let mut pages = self
            .client()
            .await
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| request_error("LIST", bucket, prefix, e))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );
        }
        tracing::debug!(bucket, prefix, count = keys.len(), "listed bucket");
        Ok(keys)
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        match self
            .client()
            .await
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err.as_service_error().is_some_and(|e| e.is_not_found())
                    || err
                        .raw_response()
                        .is_some_and(|response| response.status().as_u16() == 404);
                if not_found {
                    Ok(false)
                } else {
                    Err(request_error("HEAD", bucket, key, err))
                }
            }
        }
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        concurrency: usize,
    ) -> StoreResult<()> {
        let client = self.client().await;
        let head = client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error("HEAD", bucket, key, e))?;
        let size = object_size(bucket, key, head.content_length())?;
        let concurrency = if concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            concurrency
        };

        let io_err = |source| ObjectStoreError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;

        // Parts are fetched concurrently but yielded in order, so the file is
        // written sequentially.
        let mut parts = stream::iter(part_ranges(size))
            .map(|range| fetch_range(client, bucket, key, range))
            .buffered(concurrency);
        while let Some(part) = parts.next().await {
            file.write_all(&part?.into_bytes())
                .await
                .map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        tracing::debug!(bucket, key, size, concurrency, dest = %dest.display(), "downloaded object");
        Ok(())
    }

    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| request_error("PUT", bucket, key, e))?;
        self.client()
            .await
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| request_error("PUT", bucket, key, e))?;
        tracing::info!(bucket, key, "uploaded object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ranges_cover_every_byte_once() {
        assert!(part_ranges(0).is_empty());
        assert_eq!(part_ranges(10), vec![(0, 9)]);
        assert_eq!(
            part_ranges(PART_SIZE * 2 + 1),
            vec![
                (0, PART_SIZE - 1),
                (PART_SIZE, PART_SIZE * 2 - 1),
                (PART_SIZE * 2, PART_SIZE * 2),
            ]
        );
    }

    #[test]
    fn object_size_requires_content_length() {
        assert_eq!(object_size("b", "k", Some(10)).expect("size"), 10);
        assert_eq!(object_size("b", "k", Some(0)).expect("size"), 0);

        let err = object_size("releases", "uaa/uaa-1.2.3.tgz", None).unwrap_err();
        assert!(matches!(
            err,
            ObjectStoreError::Request { operation: "HEAD", ref key, ref message, .. }
                if key == "uaa/uaa-1.2.3.tgz" && message.contains("Content-Length")
        ));
        assert!(object_size("b", "k", Some(-1)).is_err());
    }
}
