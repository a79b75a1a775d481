use flate2::Compression;
use flate2::write::GzEncoder;
use kiln_kilnfile::{KilnfileLock, ReleaseLock, Stemcell};
use kiln_release::{LocalInventory, RequirementSet, reconcile, sha1_file};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

fn write_release(path: &Path, manifest: &str) {
    let file = std::fs::File::create(path).expect("create");
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "release.MF", manifest.as_bytes())
        .expect("append");
    builder
        .into_inner()
        .expect("tar")
        .finish()
        .expect("gzip");
}

#[test]
fn real_tarballs_partition_against_lock() {
    let dir = TempDir::new().expect("temp dir");
    let uaa = dir.path().join("uaa-1.2.3.tgz");
    write_release(
        &uaa,
        "name: uaa\nversion: 1.2.3\ncompiled_packages:\n- name: uaa\n  stemcell: ubuntu-xenial/621.55\n",
    );
    write_release(&dir.path().join("bpm-1.1.8.tgz"), "name: bpm\nversion: 1.1.8\n");
    std::fs::write(dir.path().join("README.md"), "not a release").expect("write");

    let lock = KilnfileLock {
        releases: vec![
            ReleaseLock {
                name: "uaa".to_string(),
                version: "1.2.3".to_string(),
                sha1: sha1_file(&uaa).expect("sha1"),
                ..ReleaseLock::default()
            },
            ReleaseLock {
                name: "bpm".to_string(),
                version: "1.1.9".to_string(),
                ..ReleaseLock::default()
            },
        ],
        stemcell: Stemcell::new("ubuntu-xenial", "621.55"),
    };

    let inventory = LocalInventory::new().scan(dir.path()).expect("scan");
    assert_eq!(inventory.len(), 2);

    let result = reconcile(&RequirementSet::from_lock(&lock), inventory.as_slice());
    assert_eq!(result.intersection.len(), 1);
    assert_eq!(result.intersection[0].local.local_path, uaa);
    assert_eq!(result.extra.len(), 1);
    assert_eq!(result.extra[0].local.id.version, "1.1.8");
    assert_eq!(result.missing.len(), 1);
    assert_eq!(result.missing[0].requirement.version, "1.1.9");
}
