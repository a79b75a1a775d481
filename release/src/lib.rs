//! Release identity and local-artifact handling for kiln.
//!
//! - [`ReleaseId`], [`Requirement`], [`Remote`], [`Local`]: the value types
//!   every other crate passes around
//! - [`version`]: lenient version parsing and constraint matching
//! - [`manifest`]: reads `release.MF` / `stemcell.MF` out of archives
//! - [`inventory`]: scans a releases directory without touching the network
//! - [`reconcile`]: three-way diff of a lock against a local inventory

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod checksum;
pub mod error;
pub mod id;
pub mod inventory;
pub mod manifest;
pub mod reconcile;
pub mod version;

pub use checksum::sha1_file;
pub use error::{ReleaseError, Result};
pub use id::{Local, ReleaseId, Remote, Requirement};
pub use inventory::{Inventory, LocalInventory, LocalRelease};
pub use manifest::{
    ManifestReader, ReleaseManifest, TarballManifestReader, read_stemcell_manifest,
};
pub use reconcile::{Reconciliation, RequiredRelease, RequirementSet, reconcile};
pub use version::{VersionConstraint, parse_lenient, select_highest};
