//! SQLite-backed checksum index.
//!
//! One table, `file_record`, keyed by `path`. The schema version lives in
//! `PRAGMA user_version`; migrations are additive and a failed migration
//! drops and recreates the table.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::record::FileRecord;
use crate::duplicates::DuplicateGroup;

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 2;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS file_record (
        path     TEXT PRIMARY KEY NOT NULL,
        checksum TEXT NOT NULL,
        name     TEXT NOT NULL,
        size     INTEGER NOT NULL,
        modified INTEGER NOT NULL
    );";

const CREATE_CHECKSUM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_file_record_checksum ON file_record(checksum);";

/// Restricts a query to one root; `?1` is the root itself or NULL for the
/// whole store, `?2` the root with a trailing separator, `?3` its length.
const ROOT_FILTER: &str = "(?1 IS NULL OR path = ?1 OR substr(path, 1, ?3) = ?2)";

/// Errors raised by the persistence layer.
///
/// Any of these is fatal to a running scan session.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The store was closed with [`DuplicateStore::close`].
    #[error("the duplicate store has been closed")]
    Closed,

    /// A thread panicked while holding the connection.
    #[error("the duplicate store lock is poisoned")]
    Poisoned,

    /// [`super::global::initialize`] was called twice.
    #[error("the duplicate store is already initialized")]
    AlreadyInitialized,

    /// [`super::global::get`] was called before initialization.
    #[error("the duplicate store has not been initialized")]
    NotInitialized,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent path-keyed index of hashed files.
///
/// The connection is guarded by a mutex so the store can be shared between
/// the scan coordinator and the quarantine manager; writes are still issued
/// from one control flow at a time.
pub struct DuplicateStore {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DuplicateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DuplicateStore {
    /// Open (or create) the store at `path`, migrating the schema.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or the file is not a
    /// usable SQLite database.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        log::debug!("Opened duplicate store at {}", path.display());
        Ok(store)
    }

    /// Open the store, deleting and recreating the file if it is not a
    /// readable database. The index is rebuildable, so this only costs a
    /// rescan.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be opened even after recreation.
    pub fn open_or_recreate(path: &Path) -> StoreResult<Self> {
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(StoreError::Sqlite(e)) => {
                log::warn!(
                    "Duplicate store at {} is unusable ({}), recreating it",
                    path.display(),
                    e
                );
                for suffix in ["", "-wal", "-shm"] {
                    let mut file = path.as_os_str().to_owned();
                    file.push(suffix);
                    let _ = std::fs::remove_file(PathBuf::from(file));
                }
                Self::open(path)
            }
            Err(e) => Err(e),
        }
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Fails only if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
        })
    }

    /// Location of the database file (`None` for in-memory stores).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> StoreResult<T> {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(f(conn)?)
    }

    /// Insert or replace the record for `record.path`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    pub fn upsert(&self, record: &FileRecord) -> StoreResult<()> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(UPSERT)?;
            stmt.execute(record_params(record))?;
            Ok(())
        })
    }

    /// Upsert many records in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if any write fails; nothing is committed then.
    pub fn upsert_batch(&self, records: &[FileRecord]) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare_cached(UPSERT)?;
                for record in records {
                    stmt.execute(record_params(record))?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
    }

    /// Fetch the record for a path.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    pub fn get(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        let key = path_key(path);
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT path, name, size, modified, checksum FROM file_record WHERE path = ?1",
                params![key],
                row_to_record,
            )
            .optional()
        })
    }

    /// Delete the record for a single path. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the delete fails.
    pub fn remove(&self, path: &Path) -> StoreResult<bool> {
        let key = path_key(path);
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM file_record WHERE path = ?1", params![key])?;
            Ok(n > 0)
        })
    }

    /// Delete every record at or below `root`. Returns the number removed.
    ///
    /// Matching is by whole path components: clearing `/data/a` leaves
    /// `/data/ab` untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the delete fails.
    pub fn clear_root(&self, root: &Path) -> StoreResult<usize> {
        let (key, prefix, len) = root_filter_params(Some(root));
        let removed = self.with_conn(|conn| {
            conn.execute(
                &format!("DELETE FROM file_record WHERE {ROOT_FILTER}"),
                params![key, prefix, len],
            )
        })?;
        log::debug!("Cleared {} record(s) under {}", removed, root.display());
        Ok(removed)
    }

    /// Delete every record.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the delete fails.
    pub fn clear_all(&self) -> StoreResult<usize> {
        let removed = self.with_conn(|conn| conn.execute("DELETE FROM file_record", []))?;
        log::debug!("Cleared all {} record(s)", removed);
        Ok(removed)
    }

    /// Number of records in the store.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    pub fn count(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM file_record", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| usize::try_from(n).unwrap_or(0))
    }

    /// Number of checksums shared by two or more records, optionally
    /// restricted to a root.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    pub fn duplicate_group_count(&self, root: Option<&Path>) -> StoreResult<usize> {
        let (key, prefix, len) = root_filter_params(root);
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM (SELECT checksum FROM file_record WHERE {ROOT_FILTER} \
                     GROUP BY checksum HAVING COUNT(*) > 1)"
                ),
                params![key, prefix, len],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|n| usize::try_from(n).unwrap_or(0))
    }

    /// Derive duplicate groups, optionally restricted to a root.
    ///
    /// Members are ordered oldest first (ties by path), so the first member
    /// of each group is its representative. Groups are ordered by wasted
    /// space, largest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    pub fn duplicate_groups(&self, root: Option<&Path>) -> StoreResult<Vec<DuplicateGroup>> {
        let (key, prefix, len) = root_filter_params(root);
        let records = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT path, name, size, modified, checksum FROM file_record \
                 WHERE {ROOT_FILTER} AND checksum IN ( \
                     SELECT checksum FROM file_record WHERE {ROOT_FILTER} \
                     GROUP BY checksum HAVING COUNT(*) > 1) \
                 ORDER BY checksum, modified, path"
            ))?;
            let rows = stmt.query_map(params![key, prefix, len], row_to_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        let mut current: Vec<FileRecord> = Vec::new();
        for record in records {
            if current
                .first()
                .is_some_and(|first| first.checksum != record.checksum)
            {
                groups.push(DuplicateGroup::from_records(std::mem::take(&mut current)));
            }
            current.push(record);
        }
        if !current.is_empty() {
            groups.push(DuplicateGroup::from_records(current));
        }

        groups.sort_by(|a, b| {
            b.wasted_space()
                .cmp(&a.wasted_space())
                .then_with(|| a.checksum.cmp(&b.checksum))
        });
        Ok(groups)
    }

    /// Checkpoint and release the connection. Later calls fail with
    /// [`StoreError::Closed`]; closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if SQLite refuses to close.
    pub fn close(&self) -> StoreResult<()> {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            log::debug!("Duplicate store closed");
        }
        Ok(())
    }
}

const UPSERT: &str = "INSERT INTO file_record (path, checksum, name, size, modified) \
     VALUES (?1, ?2, ?3, ?4, ?5) \
     ON CONFLICT(path) DO UPDATE SET \
         checksum = excluded.checksum, \
         name = excluded.name, \
         size = excluded.size, \
         modified = excluded.modified";

fn configure_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
}

/// Bring the schema to [`SCHEMA_VERSION`]; drop and recreate on failure.
fn migrate_schema(conn: &Connection) -> StoreResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if let Err(e) = apply_migrations(conn, version) {
        log::warn!(
            "Schema migration from version {} failed ({}), recreating the index",
            version,
            e
        );
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS file_record;
             {CREATE_TABLE}
             {CREATE_CHECKSUM_INDEX}
             PRAGMA user_version = {SCHEMA_VERSION};"
        ))?;
    }
    Ok(())
}

fn apply_migrations(conn: &Connection, from: i64) -> rusqlite::Result<()> {
    if from > SCHEMA_VERSION {
        return Err(rusqlite::Error::InvalidParameterName(format!(
            "unknown schema version {from}"
        )));
    }

    let tx = conn.unchecked_transaction()?;
    // v1: the table itself
    tx.execute_batch(CREATE_TABLE)?;
    if from < 2 {
        tx.execute_batch(CREATE_CHECKSUM_INDEX)?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    if from < SCHEMA_VERSION {
        log::info!("Migrated index schema from version {} to {}", from, SCHEMA_VERSION);
    }
    Ok(())
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn root_filter_params(root: Option<&Path>) -> (Option<String>, Option<String>, i64) {
    match root {
        Some(root) => {
            let key = path_key(root);
            let prefix = if key.ends_with(MAIN_SEPARATOR) {
                key.clone()
            } else {
                format!("{key}{MAIN_SEPARATOR}")
            };
            let len = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
            (Some(key), Some(prefix), len)
        }
        None => (None, None, 0),
    }
}

fn record_params(record: &FileRecord) -> (String, &str, &str, i64, i64) {
    (
        path_key(&record.path),
        record.checksum.as_str(),
        record.name.as_str(),
        i64::try_from(record.size).unwrap_or(i64::MAX),
        record.modified,
    )
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let path: String = row.get(0)?;
    let size: i64 = row.get(2)?;
    Ok(FileRecord {
        path: PathBuf::from(path),
        name: row.get(1)?,
        size: u64::try_from(size).unwrap_or(0),
        modified: row.get(3)?,
        checksum: row.get(4)?,
    })
}
