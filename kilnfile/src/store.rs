//! Kilnfile.lock persistence.
//!
//! Reads go through a [`LockSerializer`] so callers (and tests) can inject a
//! different encoding. Writes are idempotent and atomic:
//! 1. Serialize the lock
//! 2. Compare against the bytes already on disk; identical means no write
//! 3. Otherwise write a temp file in the same directory, fsync, rename

use crate::error::{BoxError, KilnfileError, Result};
use crate::lock::KilnfileLock;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Encoding used for the lock file.
pub trait LockSerializer: Send + Sync {
    fn serialize(&self, lock: &KilnfileLock) -> std::result::Result<String, BoxError>;

    fn deserialize(&self, text: &str) -> std::result::Result<KilnfileLock, BoxError>;
}

/// YAML encoding with a stable key order.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlLockSerializer;

impl LockSerializer for YamlLockSerializer {
    fn serialize(&self, lock: &KilnfileLock) -> std::result::Result<String, BoxError> {
        Ok(serde_yaml::to_string(lock)?)
    }

    fn deserialize(&self, text: &str) -> std::result::Result<KilnfileLock, BoxError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Whether [`KilnfileLockStore::save`] touched the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Unchanged,
    Written,
}

/// `<kilnfile>.lock`
pub fn lock_path_for(kilnfile_path: &Path) -> PathBuf {
    let mut path = kilnfile_path.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

/// Reads and rewrites one Kilnfile.lock.
pub struct KilnfileLockStore {
    path: PathBuf,
    serializer: Box<dyn LockSerializer>,
}

impl std::fmt::Debug for KilnfileLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KilnfileLockStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl KilnfileLockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            serializer: Box::new(YamlLockSerializer),
        }
    }

    /// Store for the lock file that accompanies `kilnfile_path`.
    pub fn for_kilnfile(kilnfile_path: &Path) -> Self {
        Self::new(lock_path_for(kilnfile_path))
    }

    pub fn with_serializer(mut self, serializer: impl LockSerializer + 'static) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the lock. Release names must be unique.
    pub fn load(&self) -> Result<KilnfileLock> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| KilnfileError::Read {
            path: self.path.clone(),
            source,
        })?;

        let lock = self
            .serializer
            .deserialize(&text)
            .map_err(|source| KilnfileError::Parse {
                path: self.path.clone(),
                source,
            })?;

        if let Some(name) = lock.duplicate_release_name() {
            return Err(KilnfileError::DuplicateRelease {
                name: name.to_string(),
                path: self.path.clone(),
            });
        }

        Ok(lock)
    }

    /// Write `lock` unless the file already holds exactly these bytes.
    pub fn save(&self, lock: &KilnfileLock) -> Result<WriteOutcome> {
        let contents = self
            .serializer
            .serialize(lock)
            .map_err(|source| KilnfileError::Serialize { source })?;

        match std::fs::read(&self.path) {
            Ok(existing) if existing == contents.as_bytes() => {
                tracing::debug!(path = %self.path.display(), "Kilnfile.lock already up to date");
                return Ok(WriteOutcome::Unchanged);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(KilnfileError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        self.write_atomically(contents.as_bytes())?;
        tracing::info!(path = %self.path.display(), "wrote Kilnfile.lock");
        Ok(WriteOutcome::Written)
    }

    fn write_atomically(&self, contents: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Kilnfile.lock".to_string());
        let temp_path = dir.join(format!(".{file_name}.tmp"));

        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| KilnfileError::Write { path, source }
        };

        let mut file = std::fs::File::create(&temp_path).map_err(write_err(&temp_path))?;
        file.write_all(contents).map_err(write_err(&temp_path))?;
        file.sync_all().map_err(write_err(&temp_path))?;
        drop(file);

        std::fs::rename(&temp_path, &self.path).map_err(write_err(&self.path))?;
        Ok(())
    }
}
