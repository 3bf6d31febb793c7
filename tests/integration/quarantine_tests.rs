use dupevault::actions::{
    move_file, QuarantineError, QuarantineManager, RecordingShell, ShellCall,
};
use dupevault::session::{CoordinatorConfig, ScanCoordinator, ScanRequest};
use dupevault::store::DuplicateStore;
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    store: Arc<DuplicateStore>,
    manager: QuarantineManager,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let base = dir.path().canonicalize().unwrap();
    let root = base.join("data");
    fs::create_dir_all(&root).unwrap();
    let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
    let manager = QuarantineManager::new(
        Arc::clone(&store),
        base.join("quarantine"),
        base.join("restored"),
    );
    Fixture {
        _dir: dir,
        root,
        store,
        manager,
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

fn scan(f: &Fixture) -> Vec<dupevault::duplicates::DuplicateGroup> {
    let c8r = ScanCoordinator::new(Arc::clone(&f.store), CoordinatorConfig::default()).unwrap();
    c8r.run(ScanRequest::new(&f.root)).unwrap().groups
}

#[test]
fn test_dedupe_keeps_representative_and_moves_the_rest() {
    let f = fixture();
    let a = write_file(&f.root, "a.bin", b"0123456789", 1_000);
    let b = write_file(&f.root, "b.bin", b"0123456789", 2_000);
    let c = write_file(&f.root, "c.bin", b"abcdefghij", 3_000);

    let groups = scan(&f);
    assert_eq!(groups.len(), 1);

    let report = f.manager.delete_group_duplicates(&groups[0]).unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.moved.len(), 1);
    assert_eq!(report.bytes_moved, 10);
    assert_eq!(report.moved[0].original_path, b);
    assert_eq!(
        report.moved[0].quarantine_path,
        f.manager.quarantine_dir().join("b.bin")
    );

    assert!(a.exists());
    assert!(!b.exists());
    assert!(c.exists());
    assert_eq!(
        fs::read(f.manager.quarantine_dir().join("b.bin")).unwrap(),
        b"0123456789"
    );

    // The index no longer knows the moved file.
    assert!(f.store.get(&b).unwrap().is_none());
    assert!(f.store.get(&a).unwrap().is_some());
    assert!(f.store.duplicate_groups(Some(&f.root)).unwrap().is_empty());
}

#[test]
fn test_dedupe_moves_exactly_the_wasted_bytes() {
    let f = fixture();
    for i in 0..4 {
        write_file(&f.root, &format!("dir{i}/photo.jpg"), b"pixels", 100 + i);
    }
    write_file(&f.root, "x/notes.txt", b"a longer note", 10);
    write_file(&f.root, "y/notes.txt", b"a longer note", 20);

    let groups = scan(&f);
    assert_eq!(groups.len(), 2);
    let expected: u64 = groups.iter().map(|g| g.wasted_space()).sum();

    let mut moved = 0;
    let mut bytes = 0;
    for group in &groups {
        let report = f.manager.delete_group_duplicates(group).unwrap();
        moved += report.moved.len();
        bytes += report.bytes_moved;
    }

    assert_eq!(moved, 4);
    assert_eq!(bytes, expected);
    assert!(f.root.join("dir0/photo.jpg").exists());
    assert!(f.root.join("x/notes.txt").exists());

    let q = f.manager.quarantine_dir();
    assert!(q.join("photo.jpg").exists());
    assert!(q.join("1/photo.jpg").exists());
    assert!(q.join("2/photo.jpg").exists());
    assert!(q.join("notes.txt").exists());
}

#[test]
fn test_list_then_restore() {
    let f = fixture();
    for i in 0..3 {
        write_file(&f.root, &format!("d{i}/song.mp3"), b"audio", i);
    }
    write_file(&f.root, "e/other.txt", b"other", 10);
    write_file(&f.root, "f/other.txt", b"other", 11);

    for group in scan(&f) {
        f.manager.delete_group_duplicates(&group).unwrap();
    }

    let listing = f.manager.list_quarantine().unwrap();
    assert_eq!(listing.len(), 2);
    let total: usize = listing.iter().map(|g| g.count()).sum();
    assert_eq!(total, 3);

    let entry = f.manager.entry(Path::new("1/song.mp3")).unwrap();
    assert_eq!(entry.name, "song.mp3");
    assert_eq!(entry.size, 5);

    let shell = RecordingShell::new(true);
    let restored = f.manager.restore_file(&entry, &shell).unwrap();

    assert_eq!(restored.to, f.manager.restore_dir().join("song.mp3"));
    assert_eq!(fs::read(&restored.to).unwrap(), b"audio");
    assert!(matches!(shell.calls().as_slice(), [ShellCall::Confirm(_)]));
    assert!(!f.manager.quarantine_dir().join("1").exists());

    let listing = f.manager.list_quarantine().unwrap();
    let remaining: Vec<PathBuf> = listing
        .iter()
        .flat_map(|g| g.entries.iter().map(|e| e.quarantine_path.clone()))
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&f.manager.quarantine_dir().join("song.mp3")));
    assert!(remaining.contains(&f.manager.quarantine_dir().join("other.txt")));

    // A second copy with the same name gets a numbered name.
    let entry = f.manager.entry(Path::new("song.mp3")).unwrap();
    let restored = f.manager.restore_file(&entry, &shell).unwrap();
    assert_eq!(restored.to, f.manager.restore_dir().join("song (1).mp3"));
}

#[test]
fn test_restore_missing_entry_fails() {
    let f = fixture();
    write_file(&f.root, "a/x.txt", b"same", 1);
    write_file(&f.root, "b/x.txt", b"same", 2);
    for group in scan(&f) {
        f.manager.delete_group_duplicates(&group).unwrap();
    }

    let entry = f.manager.entry(Path::new("x.txt")).unwrap();
    fs::remove_file(&entry.quarantine_path).unwrap();

    let err = f
        .manager
        .restore_file(&entry, &RecordingShell::new(true))
        .unwrap_err();
    assert!(matches!(err, QuarantineError::NotFound(_)));
}

#[test]
fn test_stale_group_with_deleted_representative_is_untouched() {
    let f = fixture();
    let a = write_file(&f.root, "a.txt", b"same", 1);
    let b = write_file(&f.root, "b.txt", b"same", 2);
    let groups = scan(&f);

    fs::remove_file(&a).unwrap();
    let err = f.manager.delete_group_duplicates(&groups[0]).unwrap_err();

    assert!(matches!(err, QuarantineError::RepresentativeMissing(_)));
    assert!(b.exists());
    assert!(!f.manager.quarantine_dir().join("b.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_failed_delete_rolls_back_copy() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let locked = dir.path().join("locked");
    let target = dir.path().join("target");
    fs::create_dir_all(&locked).unwrap();
    fs::create_dir_all(&target).unwrap();
    let source = locked.join("file.txt");
    fs::write(&source, "content").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    // Permissions do not apply to root.
    let canary = locked.join("canary");
    if fs::write(&canary, "x").is_ok() {
        let _ = fs::remove_file(&canary);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let destination = target.join("file.txt");
    let result = move_file(&source, &destination);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(
        result,
        Err(QuarantineError::SourceNotRemoved { .. })
    ));
    assert!(source.exists());
    assert!(!destination.exists());
}
