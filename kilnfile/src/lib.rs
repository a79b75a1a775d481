//! Kilnfile and Kilnfile.lock for kiln.
//!
//! The Kilnfile expresses intent: which release sources exist and which
//! releases (by version constraint) a tile needs. The Kilnfile.lock expresses
//! fact: one exact, pinned entry per release plus the resolved stemcell.
//!
//! Lock persistence goes through [`KilnfileLockStore`], which only touches the
//! file when the serialized content actually differs from what is on disk.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod error;
pub mod kilnfile;
pub mod lock;
pub mod store;

pub use error::{KilnfileError, Result};
pub use kilnfile::{Kilnfile, ReleaseSourceConfig, ReleaseSpec, Stemcell, load_kilnfile};
pub use lock::{KilnfileLock, ReleaseLock};
pub use store::{KilnfileLockStore, LockSerializer, WriteOutcome, YamlLockSerializer, lock_path_for};

use std::path::Path;

/// Load a Kilnfile and the `<Kilnfile>.lock` that sits next to it.
pub fn load_kilnfiles(kilnfile_path: &Path) -> Result<(Kilnfile, KilnfileLock)> {
    let kilnfile = load_kilnfile(kilnfile_path)?;
    let lock = KilnfileLockStore::for_kilnfile(kilnfile_path).load()?;
    Ok((kilnfile, lock))
}
