//! Object storage seam used by the S3-backed release sources.

use crate::error::{ObjectStoreError, Result};
use crate::source::{
    commit_download, download_destination, finish_download, partial_destination, remove_partial,
};
use async_trait::async_trait;
use kiln_release::{Local, Remote};
use std::path::Path;

pub type StoreResult<T> = std::result::Result<T, ObjectStoreError>;

/// The handful of bucket operations the S3 sources need.
///
/// Implementations:
/// - [`crate::s3::AwsObjectStore`]: AWS SDK client
/// - `mock::MemoryObjectStore` (tests): in-memory buckets
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every key in `bucket` starting with `prefix`, across all pages.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Metadata-only existence check. A 404 is `Ok(false)`.
    async fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// Write the object to `dest`, using up to `concurrency` ranged requests
    /// in flight (`0` for the default).
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        concurrency: usize,
    ) -> StoreResult<()>;

    /// Upload the file at `source` to `key`.
    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> StoreResult<()>;
}

/// Download `remote` from `bucket` into `dir` under the key's file name and
/// checksum it. Bytes land in a partial file that is renamed once the
/// transfer completes; a failed transfer leaves no file behind.
pub(crate) async fn download_to_dir(
    store: &dyn ObjectStore,
    bucket: &str,
    source_id: &str,
    dir: &Path,
    remote: &Remote,
    download_threads: usize,
) -> Result<Local> {
    let dest = download_destination(dir, remote);
    let partial = partial_destination(&dest);
    tracing::info!(
        release = %remote.id.name,
        source_id,
        key = %remote.remote_path,
        "downloading release from s3"
    );
    if let Err(err) = store
        .download(bucket, &remote.remote_path, &partial, download_threads)
        .await
    {
        remove_partial(&partial);
        return Err(err.into());
    }
    commit_download(&partial, &dest)?;
    finish_download(dest, remote)
}
