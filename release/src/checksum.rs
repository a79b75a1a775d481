use crate::error::{ReleaseError, Result};
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::Path;

/// Lowercase hex SHA1 of the file at `path`.
pub fn sha1_file(path: &Path) -> Result<String> {
    let checksum_err = |source| ReleaseError::Checksum {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(checksum_err)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(checksum_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
