//! Release sources for kiln.
//!
//! A [`ReleaseSource`] knows how to locate release artifacts in one backend
//! and download them. Three backends ship here:
//! - [`RegexReleaseSource`]: S3 bucket, keys recognised by a regex
//! - [`TemplateReleaseSource`]: S3 bucket, keys computed from a path template
//! - [`BoshIoReleaseSource`]: the public bosh.io index
//!
//! [`SourceFactory`] builds them from Kilnfile entries and
//! [`MultiReleaseSource`] combines them in Kilnfile order.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod bosh_io;
pub mod error;
pub mod factory;
pub mod multi;
pub mod object_store;
pub mod regex_source;
pub mod s3;
pub mod source;
pub mod template;
pub mod template_source;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use bosh_io::{BoshIoReleaseSource, DEFAULT_BOSH_IO_URL};
pub use error::{ObjectStoreError, Result, SourceError};
pub use factory::{SourceFactory, source_id};
pub use multi::MultiReleaseSource;
pub use object_store::ObjectStore;
pub use regex_source::{ArtifactKind, RegexReleaseSource};
pub use s3::{AwsObjectStore, S3Settings};
pub use source::{
    ReleaseSource, ReleaseUploader, RemotePathGenerator, SOURCE_TYPE_BOSH_IO, SOURCE_TYPE_S3,
};
pub use template::{PathTemplate, TemplateFields};
pub use template_source::TemplateReleaseSource;
