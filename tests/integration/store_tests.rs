use dupevault::session::{CoordinatorConfig, ScanCoordinator, ScanRequest};
use dupevault::store::{DuplicateStore, FileRecord, SCHEMA_VERSION};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn record(path: &str, checksum: &str) -> FileRecord {
    FileRecord {
        path: PathBuf::from(path),
        name: Path::new(path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned(),
        size: 4,
        modified: 1,
        checksum: checksum.to_string(),
    }
}

fn user_version(path: &Path) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("nested").join("index.sqlite3");

    {
        let store = DuplicateStore::open(&db).unwrap();
        store.upsert(&record("/data/a.txt", "aa")).unwrap();
        store.upsert(&record("/data/b.txt", "aa")).unwrap();
        store.close().unwrap();
    }

    let store = DuplicateStore::open(&db).unwrap();
    assert_eq!(store.path(), Some(db.as_path()));
    assert_eq!(store.count().unwrap(), 2);
    assert_eq!(store.duplicate_groups(None).unwrap().len(), 1);
}

#[test]
fn test_migrates_version_one_database() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("index.sqlite3");
    {
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE file_record (
                path     TEXT PRIMARY KEY NOT NULL,
                checksum TEXT NOT NULL,
                name     TEXT NOT NULL,
                size     INTEGER NOT NULL,
                modified INTEGER NOT NULL
            );
            INSERT INTO file_record VALUES ('/old/a.txt', 'ff', 'a.txt', 4, 1);
            PRAGMA user_version = 1;",
        )
        .unwrap();
    }

    let store = DuplicateStore::open(&db).unwrap();
    assert!(store.get(Path::new("/old/a.txt")).unwrap().is_some());
    store.close().unwrap();

    assert_eq!(user_version(&db), SCHEMA_VERSION);
    let conn = Connection::open(&db).unwrap();
    let indexes: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' \
             AND name = 'idx_file_record_checksum'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indexes, 1);
}

#[test]
fn test_unknown_schema_version_is_recreated() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("index.sqlite3");
    {
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE file_record (path TEXT PRIMARY KEY, checksum TEXT, \
                 name TEXT, size INTEGER, modified INTEGER);
             INSERT INTO file_record VALUES ('/x', 'aa', 'x', 1, 1);
             PRAGMA user_version = 99;",
        )
        .unwrap();
    }

    let store = DuplicateStore::open(&db).unwrap();
    assert_eq!(store.count().unwrap(), 0);
    store.close().unwrap();
    assert_eq!(user_version(&db), SCHEMA_VERSION);
}

#[test]
fn test_corrupt_file_is_recreated() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("index.sqlite3");
    fs::write(&db, b"this is not a sqlite database, just garbage bytes").unwrap();

    assert!(DuplicateStore::open(&db).is_err());

    let store = DuplicateStore::open_or_recreate(&db).unwrap();
    assert_eq!(store.count().unwrap(), 0);
    store.upsert(&record("/data/a.txt", "aa")).unwrap();
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_scans_of_different_roots_share_one_store() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().canonicalize().unwrap();
    let first = base.join("a");
    let second = base.join("ab");
    for root in [&first, &second] {
        fs::create_dir_all(root).unwrap();
        fs::write(root.join("x.txt"), "same").unwrap();
        fs::write(root.join("y.txt"), "same").unwrap();
    }

    let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
    let c8r = ScanCoordinator::new(Arc::clone(&store), CoordinatorConfig::default()).unwrap();
    c8r.run(ScanRequest::new(&first)).unwrap();
    let outcome = c8r.run(ScanRequest::new(&second)).unwrap();

    // Each scan reports only its own root.
    assert_eq!(outcome.groups.len(), 1);
    assert!(outcome.groups[0]
        .files
        .iter()
        .all(|f| f.path.starts_with(&second)));

    // Across roots all four files share one checksum.
    let all = store.duplicate_groups(None).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].count(), 4);

    // Rescanning the first root does not disturb the second.
    c8r.run(ScanRequest::new(&first)).unwrap();
    assert_eq!(store.count().unwrap(), 4);

    assert_eq!(store.clear_root(&first).unwrap(), 2);
    assert_eq!(store.duplicate_groups(Some(&second)).unwrap().len(), 1);
    assert_eq!(store.count().unwrap(), 2);
}
