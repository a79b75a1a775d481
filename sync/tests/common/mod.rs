#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use kiln_fetcher::mock::FakeReleaseSource;
use kiln_fetcher::{MultiReleaseSource, ReleaseSource};
use kiln_kilnfile::{KilnfileLock, KilnfileLockStore, ReleaseLock, Stemcell};
use std::path::PathBuf;
use tempfile::TempDir;

/// A gzipped tarball holding a single `entry` with `contents`.
pub fn tgz(entry: &str, contents: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, entry, contents.as_bytes())
        .expect("append");
    builder.into_inner().expect("tar").finish().expect("gzip")
}

/// A built (uncompiled) release archive.
pub fn release_tgz(name: &str, version: &str) -> Vec<u8> {
    tgz("release.MF", &format!("name: {name}\nversion: {version}\n"))
}

pub fn compiled_release_tgz(name: &str, version: &str, stemcell: &Stemcell) -> Vec<u8> {
    tgz(
        "release.MF",
        &format!(
            "name: {name}\nversion: {version}\ncompiled_packages:\n- name: {name}\n  stemcell: {}/{}\n",
            stemcell.os, stemcell.version
        ),
    )
}

pub fn sha1_of(bytes: &[u8]) -> String {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("blob");
    std::fs::write(&path, bytes).expect("write");
    kiln_release::sha1_file(&path).expect("sha1")
}

pub fn release(name: &str, version: &str) -> ReleaseLock {
    ReleaseLock {
        name: name.to_string(),
        version: version.to_string(),
        ..ReleaseLock::default()
    }
}

pub fn located(name: &str, version: &str, sha1: &str, source: &str, path: &str) -> ReleaseLock {
    ReleaseLock {
        name: name.to_string(),
        version: version.to_string(),
        sha1: sha1.to_string(),
        remote_source: source.to_string(),
        remote_path: path.to_string(),
    }
}

pub fn xenial() -> Stemcell {
    Stemcell::new("ubuntu-xenial", "621.55")
}

/// A Kilnfile.lock on disk plus a releases directory next to it.
pub struct Workspace {
    pub dir: TempDir,
    pub store: KilnfileLockStore,
}

impl Workspace {
    pub fn new(lock: &KilnfileLock) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = KilnfileLockStore::new(dir.path().join("Kilnfile.lock"));
        store.save(lock).expect("seed lock");
        Self { dir, store }
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.dir.path().join("releases")
    }

    pub fn put_release(&self, file_name: &str, body: &[u8]) -> PathBuf {
        let dir = self.releases_dir();
        std::fs::create_dir_all(&dir).expect("releases dir");
        let path = dir.join(file_name);
        std::fs::write(&path, body).expect("write release");
        path
    }

    pub fn lock_bytes(&self) -> Vec<u8> {
        std::fs::read(self.store.path()).expect("read lock")
    }

    pub fn lock(&self) -> KilnfileLock {
        self.store.load().expect("load lock")
    }

    pub fn release_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.releases_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn sources(fakes: Vec<FakeReleaseSource>) -> MultiReleaseSource {
    MultiReleaseSource::new(
        fakes
            .into_iter()
            .map(|fake| Box::new(fake) as Box<dyn ReleaseSource>)
            .collect(),
    )
    .expect("unique ids")
}
