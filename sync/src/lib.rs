//! Kilnfile.lock write-paths.
//!
//! Each operation loads the lock, resolves everything it needs through a
//! [`MultiReleaseSource`](kiln_fetcher::MultiReleaseSource), and only then
//! writes. A failure at any step leaves the lock file as it was; a result
//! identical to what is already locked leaves the file untouched.

#![deny(clippy::print_stdout, clippy::print_stderr)]

mod download;
pub mod error;
pub mod fetch;
pub mod report;
pub mod sync_local;
pub mod update_release;
pub mod update_stemcell;
pub mod upload;

pub use error::{ErrorCategory, ReleaseFailure, Result, SyncError};
pub use fetch::{FetchOptions, FetchReport, fetch};
pub use report::{
    MissingReleasesReport, ReleaseRef, ReleaseVersionReport, find_release_version,
    missing_releases,
};
pub use sync_local::{SyncWithLocalOptions, SyncWithLocalReport, sync_with_local};
pub use update_release::{UpdateOutcome, UpdateReleaseOptions, update_release};
pub use update_stemcell::{StemcellInput, StemcellOutcome, UpdateStemcellOptions, update_stemcell};
pub use upload::upload_release;
