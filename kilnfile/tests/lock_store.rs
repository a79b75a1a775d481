use kiln_kilnfile::{
    KilnfileError, KilnfileLock, KilnfileLockStore, LockSerializer, ReleaseLock, Stemcell,
    WriteOutcome, load_kilnfiles, lock_path_for,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

const LOCK_YAML: &str = "releases:
- name: uaa
  version: 1.2.3
  sha1: 0123456789abcdef0123456789abcdef01234567
  remote_source: compiled-releases
  remote_path: uaa/uaa-1.2.3-ubuntu-xenial-621.55.tgz
- name: bpm
  version: 1.1.9
  sha1: fedcba9876543210fedcba9876543210fedcba98
  remote_source: bosh.io
  remote_path: https://bosh.io/d/github.com/cloudfoundry/bpm-release?v=1.1.9
stemcell_criteria:
  os: ubuntu-xenial
  version: '621.55'
";

fn write_lock(dir: &Path) -> KilnfileLockStore {
    let path = dir.join("Kilnfile.lock");
    std::fs::write(&path, LOCK_YAML).expect("write lock");
    KilnfileLockStore::new(path)
}

#[test]
fn lock_path_appends_suffix() {
    assert_eq!(
        lock_path_for(Path::new("tile/Kilnfile")),
        Path::new("tile/Kilnfile.lock")
    );
}

#[test]
fn load_then_save_is_a_no_op() {
    let dir = TempDir::new().expect("temp dir");
    let store = write_lock(dir.path());

    let lock = store.load().expect("load");
    assert_eq!(lock.releases.len(), 2);
    assert_eq!(lock.stemcell, Stemcell::new("ubuntu-xenial", "621.55"));

    store.save(&lock).expect("normalizing save");
    let normalized = std::fs::read(store.path()).expect("read");

    let reloaded = store.load().expect("reload");
    assert_eq!(reloaded, lock);
    assert_eq!(store.save(&reloaded).expect("save"), WriteOutcome::Unchanged);
    assert_eq!(std::fs::read(store.path()).expect("read"), normalized);
}

#[test]
fn second_write_of_a_changed_lock_is_unchanged() {
    let dir = TempDir::new().expect("temp dir");
    let store = write_lock(dir.path());

    let mut lock = store.load().expect("load");
    if let Some(entry) = lock.find_release_mut("bpm") {
        entry.version = "1.2.0".to_string();
    }

    assert_eq!(store.save(&lock).expect("first save"), WriteOutcome::Written);
    let after_first = std::fs::read(store.path()).expect("read");
    assert_eq!(store.save(&lock).expect("second save"), WriteOutcome::Unchanged);
    assert_eq!(std::fs::read(store.path()).expect("read"), after_first);

    let reloaded = store.load().expect("reload");
    assert_eq!(reloaded, lock);
    assert!(!dir.path().join(".Kilnfile.lock.tmp").exists());
}

#[test]
fn duplicate_release_names_are_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("Kilnfile.lock");
    std::fs::write(
        &path,
        "releases:\n- name: uaa\n  version: 1.0.0\n- name: uaa\n  version: 2.0.0\n",
    )
    .expect("write");

    let err = KilnfileLockStore::new(path).load().unwrap_err();
    match err {
        KilnfileError::DuplicateRelease { name, .. } => assert_eq!(name, "uaa"),
        other => panic!("unexpected error: {other}"),
    }
}

struct FailingSerializer;

impl LockSerializer for FailingSerializer {
    fn serialize(&self, _lock: &KilnfileLock) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Err("encoder exploded".into())
    }

    fn deserialize(&self, text: &str) -> Result<KilnfileLock, Box<dyn std::error::Error + Send + Sync>> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[test]
fn serializer_failure_leaves_file_untouched() {
    let dir = TempDir::new().expect("temp dir");
    let store = write_lock(dir.path()).with_serializer(FailingSerializer);

    let mut lock = store.load().expect("load");
    lock.releases.push(ReleaseLock {
        name: "capi".to_string(),
        ..ReleaseLock::default()
    });

    let err = store.save(&lock).unwrap_err();
    assert!(matches!(err, KilnfileError::Serialize { .. }));
    assert_eq!(std::fs::read_to_string(store.path()).expect("read"), LOCK_YAML);
}

#[test]
fn load_kilnfiles_reads_both_files() {
    let dir = TempDir::new().expect("temp dir");
    let kilnfile_path = dir.path().join("Kilnfile");
    std::fs::write(
        &kilnfile_path,
        "release_sources:\n- type: bosh.io\nreleases:\n- name: uaa\n  version: ~1.2\n",
    )
    .expect("write Kilnfile");
    write_lock(dir.path());

    let (kilnfile, lock) = load_kilnfiles(&kilnfile_path).expect("load");
    assert_eq!(kilnfile.releases[0].version, "~1.2");
    assert_eq!(lock.find_release("uaa").map(|r| r.version.as_str()), Some("1.2.3"));
}
