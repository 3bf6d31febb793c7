use dupevault::scanner::{Checksum, ChecksumEngine, Hasher};
use dupevault::session::{CoordinatorConfig, ScanCoordinator, ScanRequest, ScanStatus};
use dupevault::store::DuplicateStore;
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records every path it is asked to hash.
#[derive(Default)]
struct CountingEngine {
    inner: Hasher,
    seen: Mutex<Vec<PathBuf>>,
}

impl CountingEngine {
    fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

impl ChecksumEngine for CountingEngine {
    fn compute_checksum(&self, path: &Path) -> Checksum {
        self.seen.lock().unwrap().push(path.to_path_buf());
        self.inner.compute_checksum(path)
    }
}

fn write_file(dir: &Path, name: &str, content: &[u8], mtime: i64) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    path
}

/// A and B share content, C has the same size but different bytes.
fn scenario_abc(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let a = write_file(dir, "a.bin", b"0123456789", 1_000);
    let b = write_file(dir, "b.bin", b"0123456789", 2_000);
    let c = write_file(dir, "c.bin", b"abcdefghij", 3_000);
    (a, b, c)
}

fn coordinator(config: CoordinatorConfig) -> ScanCoordinator {
    let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
    ScanCoordinator::new(store, config).unwrap()
}

fn counting_coordinator(config: CoordinatorConfig) -> (ScanCoordinator, Arc<CountingEngine>) {
    let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
    let engine = Arc::new(CountingEngine::default());
    let coordinator = ScanCoordinator::with_engine(store, config, engine.clone()).unwrap();
    (coordinator, engine)
}

#[test]
fn test_scan_same_size_files_yields_one_group() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let (a, b, c) = scenario_abc(&root);

    let c8r = coordinator(CoordinatorConfig::default());
    let outcome = c8r.run(ScanRequest::new(&root)).unwrap();

    assert_eq!(outcome.status(), ScanStatus::Completed);
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.snapshot.duplicate_count, 1);
    assert_eq!(outcome.snapshot.processed, 3);
    assert_eq!(outcome.snapshot.total, 3);

    let group = &outcome.groups[0];
    assert_eq!(group.paths(), vec![a.clone(), b]);
    assert_eq!(group.representative().unwrap().path, a);
    assert_eq!(group.wasted_space(), 10);
    assert!(!group.paths().contains(&c));

    assert_eq!(outcome.summary.candidates, 3);
    assert_eq!(outcome.summary.hashed, 3);
    assert_eq!(outcome.summary.failed, 0);
    assert_eq!(c8r.results(), Some(outcome.groups.clone()));
}

#[test]
fn test_quick_scan_never_hashes_unique_sizes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let (a, b, _) = scenario_abc(&root);
    let d = write_file(&root, "d.bin", b"1234567", 4_000);

    let config = CoordinatorConfig::default().with_quick_scan_threshold(2);
    let (c8r, engine) = counting_coordinator(config);
    let outcome = c8r.run(ScanRequest::new(&root)).unwrap();

    assert_eq!(outcome.status(), ScanStatus::Completed);
    assert!(!engine.seen().contains(&d));
    assert_eq!(engine.seen().len(), 3);
    assert_eq!(outcome.summary.skipped_by_size, 1);
    assert_eq!(outcome.snapshot.skipped_by_size, 1);
    assert_eq!(outcome.snapshot.total, 3);
    assert!(outcome.summary.pruning.is_some());

    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].paths(), vec![a, b]);
    assert!(c8r.store().get(&d).unwrap().is_none());
}

#[test]
fn test_quick_scan_disabled_hashes_everything() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    scenario_abc(&root);
    let d = write_file(&root, "d.bin", b"1234567", 4_000);

    let config = CoordinatorConfig::default().with_quick_scan_threshold(2);
    let (c8r, engine) = counting_coordinator(config);
    let outcome = c8r
        .run(ScanRequest::new(&root).with_quick_scan(false))
        .unwrap();

    assert_eq!(engine.seen().len(), 4);
    assert!(engine.seen().contains(&d));
    assert_eq!(outcome.summary.skipped_by_size, 0);
    assert!(outcome.summary.pruning.is_none());
    assert_eq!(outcome.groups.len(), 1);
}

#[test]
fn test_quick_scan_below_threshold_hashes_everything() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    scenario_abc(&root);
    write_file(&root, "d.bin", b"1234567", 4_000);

    let (c8r, engine) = counting_coordinator(CoordinatorConfig::default());
    let outcome = c8r.run(ScanRequest::new(&root)).unwrap();

    assert_eq!(engine.seen().len(), 4);
    assert!(outcome.summary.pruning.is_none());
}

#[test]
fn test_scan_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    scenario_abc(&root);
    write_file(&root, "sub/e.bin", b"0123456789", 5_000);
    write_file(&root, "sub/f.txt", b"hello", 6_000);
    write_file(&root, "g.txt", b"hello", 7_000);

    let c8r = coordinator(CoordinatorConfig::default());
    let first = c8r.run(ScanRequest::new(&root)).unwrap();
    let records_after_first = c8r.store().count().unwrap();
    let second = c8r.run(ScanRequest::new(&root)).unwrap();

    assert_eq!(first.groups, second.groups);
    assert_eq!(first.groups.len(), 2);
    assert_eq!(first.snapshot.duplicate_count, second.snapshot.duplicate_count);
    assert_eq!(first.summary.hashed, second.summary.hashed);
    assert_eq!(records_after_first, c8r.store().count().unwrap());
}

#[test]
fn test_rescan_forgets_deleted_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let (_, b, _) = scenario_abc(&root);

    let c8r = coordinator(CoordinatorConfig::default());
    assert_eq!(c8r.run(ScanRequest::new(&root)).unwrap().groups.len(), 1);

    fs::remove_file(&b).unwrap();
    let outcome = c8r.run(ScanRequest::new(&root)).unwrap();

    assert!(outcome.groups.is_empty());
    assert!(c8r.store().get(&b).unwrap().is_none());
    assert_eq!(c8r.store().count().unwrap(), 2);
}

#[test]
fn test_extension_filter() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    write_file(&root, "a.JPG", b"pixels", 1);
    write_file(&root, "b.jpg", b"pixels", 2);
    write_file(&root, "c.txt", b"words", 3);
    write_file(&root, "d.txt", b"words", 4);

    let c8r = coordinator(CoordinatorConfig::default());
    let outcome = c8r
        .run(ScanRequest::new(&root).with_extensions([".jpg"]))
        .unwrap();

    assert_eq!(outcome.summary.candidates, 2);
    assert_eq!(outcome.groups.len(), 1);
    assert!(outcome.groups[0]
        .files
        .iter()
        .all(|f| f.name.to_lowercase().ends_with(".jpg")));
    assert!(outcome.snapshot.extensions.contains("jpg"));
}

#[test]
fn test_empty_files_are_skipped_by_default() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    write_file(&root, "empty1", b"", 1);
    write_file(&root, "empty2", b"", 2);

    let outcome = coordinator(CoordinatorConfig::default())
        .run(ScanRequest::new(&root))
        .unwrap();
    assert_eq!(outcome.summary.candidates, 0);
    assert!(outcome.groups.is_empty());

    let outcome = coordinator(CoordinatorConfig::default().with_include_empty(true))
        .run(ScanRequest::new(&root))
        .unwrap();
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].wasted_space(), 0);
}

#[test]
fn test_hidden_files_can_be_skipped() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    write_file(&root, "visible.txt", b"same", 1);
    write_file(&root, ".hidden.txt", b"same", 2);

    let outcome = coordinator(CoordinatorConfig::default())
        .run(ScanRequest::new(&root))
        .unwrap();
    assert_eq!(outcome.groups.len(), 1);

    let outcome = coordinator(CoordinatorConfig::default().with_skip_hidden(true))
        .run(ScanRequest::new(&root))
        .unwrap();
    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.summary.candidates, 1);
}

#[test]
fn test_excluded_directory_is_not_walked() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    write_file(&root, "a.txt", b"same", 1);
    write_file(&root, "quarantine/a.txt", b"same", 2);

    let config = CoordinatorConfig::default().with_exclude(root.join("quarantine"));
    let outcome = coordinator(config).run(ScanRequest::new(&root)).unwrap();

    assert_eq!(outcome.summary.candidates, 1);
    assert!(outcome.groups.is_empty());
}

#[test]
fn test_multiple_hash_threads_find_same_groups() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    for i in 0..30 {
        let content = format!("content-{}", i % 10);
        write_file(&root, &format!("f{i:02}.txt"), content.as_bytes(), i64::from(i));
    }

    let single = coordinator(CoordinatorConfig::default())
        .run(ScanRequest::new(&root))
        .unwrap();
    let parallel = coordinator(CoordinatorConfig::default().with_hash_threads(4))
        .run(ScanRequest::new(&root))
        .unwrap();

    assert_eq!(single.groups.len(), 10);
    assert_eq!(single.groups, parallel.groups);
    assert!(single.groups.iter().all(|g| g.count() == 3));
}

#[test]
fn test_start_runs_in_background() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    scenario_abc(&root);

    let c8r = coordinator(CoordinatorConfig::default());
    let rx = c8r.subscribe();
    let handle = c8r.start(ScanRequest::new(&root)).unwrap();
    let session_id = handle.session_id();
    let outcome = handle.wait().unwrap();

    assert_eq!(outcome.status(), ScanStatus::Completed);
    assert_eq!(outcome.snapshot.session_id, session_id);
    assert_eq!(c8r.snapshot().status, ScanStatus::Completed);

    let last = rx.try_iter().last().unwrap();
    assert_eq!(last.status, ScanStatus::Completed);
    assert_eq!(last.duplicate_count, 1);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_counted_and_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let (a, b, _) = scenario_abc(&root);
    let locked = write_file(&root, "locked.bin", b"0123456789", 500);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Permissions do not apply to root.
    if fs::File::open(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
        return;
    }

    let outcome = coordinator(CoordinatorConfig::default())
        .run(ScanRequest::new(&root))
        .unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(outcome.status(), ScanStatus::Completed);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.snapshot.failed, 1);
    assert_eq!(outcome.snapshot.processed, 4);
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].paths(), vec![a, b]);
}
