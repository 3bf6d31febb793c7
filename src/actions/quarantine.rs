//! Non-destructive duplicate removal.
//!
//! # Overview
//!
//! Instead of deleting redundant copies, [`QuarantineManager`] moves them
//! into a recovery directory. The representative of a group (oldest file,
//! ties broken by path) is never touched, so at least one live copy always
//! remains where it was.
//!
//! # Layout
//!
//! Files keep their original name. When a name is already taken in the
//! quarantine directory, the file goes into the first free numbered
//! subdirectory instead:
//!
//! ```text
//! quarantine/
//!   photo.jpg
//!   1/photo.jpg
//!   2/photo.jpg
//! ```
//!
//! # Safety
//!
//! - A move is an atomic rename when possible, otherwise copy then delete.
//! - If the original cannot be deleted after copying, the copy is removed
//!   and the original stays in place.
//! - Each file's size is checked against its index record right before it
//!   is moved; a mismatch skips the file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duplicates::DuplicateGroup;
use crate::scanner::{
    file_name_of, hash_to_hex, Checksum, ChecksumEngine, Hasher, Walker, WalkerConfig,
};
use crate::store::{DuplicateStore, FileRecord, StoreError};

use super::shell::ShellCapabilities;

/// Error type for quarantine operations.
#[derive(Debug, thiserror::Error)]
pub enum QuarantineError {
    /// A group needs at least two members to have anything to remove.
    #[error("duplicate group has {0} member(s); at least 2 are required")]
    TooFewMembers(usize),

    /// The file to keep is gone or changed, so nothing is moved.
    #[error("representative is missing or changed: {0}")]
    RepresentativeMissing(PathBuf),

    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// File changed size since it was indexed.
    #[error("file modified since scan: {path} (expected {expected} bytes, found {actual})")]
    Modified {
        /// File that changed
        path: PathBuf,
        /// Size in the index
        expected: u64,
        /// Size on disk
        actual: u64,
    },

    /// The copy succeeded but the original could not be removed; the copy
    /// was rolled back.
    #[error("could not remove {path} after copying it: {source}")]
    SourceNotRemoved {
        /// File left in place
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The user declined a restore.
    #[error("restore of {0} was declined")]
    RestoreDeclined(PathBuf),

    /// The path is not inside the quarantine directory.
    #[error("not a quarantined file: {0}")]
    NotQuarantined(PathBuf),

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The index could not be updated.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QuarantineError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// A file that was moved into quarantine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Where the file was
    pub original_path: PathBuf,
    /// Where the file is now
    pub quarantine_path: PathBuf,
    /// When it was moved
    pub moved_at: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
}

/// Outcome of quarantining one duplicate group.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuarantineReport {
    /// Files moved into quarantine.
    pub moved: Vec<QuarantineRecord>,
    /// Files left in place, with the reason.
    pub failures: Vec<(PathBuf, String)>,
    /// Total bytes moved.
    pub bytes_moved: u64,
}

impl QuarantineReport {
    /// Check if every file was moved.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: QuarantineReport) {
        self.bytes_moved += other.bytes_moved;
        self.moved.extend(other.moved);
        self.failures.extend(other.failures);
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        let size = bytesize::ByteSize::b(self.bytes_moved);
        if self.all_succeeded() {
            format!("Quarantined {} file(s), {}", self.moved.len(), size)
        } else {
            format!(
                "Quarantined {} file(s), {} failed, {}",
                self.moved.len(),
                self.failures.len(),
                size
            )
        }
    }
}

/// A file found in the quarantine directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    /// Location inside the quarantine directory
    pub quarantine_path: PathBuf,
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// BLAKE3 content hash, lowercase hex
    pub checksum: String,
    /// Modification time, seconds since the UNIX epoch
    pub modified: i64,
}

/// Quarantined files sharing one checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineGroup {
    /// Shared content hash
    pub checksum: String,
    /// Members, ordered by path
    pub entries: Vec<QuarantineEntry>,
}

impl QuarantineGroup {
    /// Number of files in this group.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Total size of all files in this group.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// A file moved back out of quarantine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreResult {
    /// Former quarantine location
    pub from: PathBuf,
    /// New location in the restore directory
    pub to: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// Moves duplicates into and out of the quarantine directory.
pub struct QuarantineManager {
    store: Arc<DuplicateStore>,
    quarantine_dir: PathBuf,
    restore_dir: PathBuf,
    engine: Arc<dyn ChecksumEngine>,
}

impl std::fmt::Debug for QuarantineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuarantineManager")
            .field("quarantine_dir", &self.quarantine_dir)
            .field("restore_dir", &self.restore_dir)
            .finish_non_exhaustive()
    }
}

impl QuarantineManager {
    /// Create a manager. Directories are created on first use.
    #[must_use]
    pub fn new(store: Arc<DuplicateStore>, quarantine_dir: PathBuf, restore_dir: PathBuf) -> Self {
        Self {
            store,
            quarantine_dir,
            restore_dir,
            engine: Arc::new(Hasher::new()),
        }
    }

    /// Use a custom checksum engine for listings.
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn ChecksumEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Recovery area for removed duplicates.
    #[must_use]
    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    /// Destination for restored files.
    #[must_use]
    pub fn restore_dir(&self) -> &Path {
        &self.restore_dir
    }

    /// Move every member except the representative into quarantine.
    ///
    /// The representative is the oldest member, ties broken by path,
    /// whatever order the group lists its files in.
    ///
    /// Per-file problems are collected in the report; the remaining files
    /// are still processed.
    ///
    /// # Errors
    ///
    /// Fails before moving anything if the group has fewer than two members
    /// or its representative is gone. Fails midway if the index cannot be
    /// updated.
    pub fn delete_group_duplicates(
        &self,
        group: &DuplicateGroup,
    ) -> Result<QuarantineReport, QuarantineError> {
        if group.count() < 2 {
            return Err(QuarantineError::TooFewMembers(group.count()));
        }
        let Some(representative) = group.representative() else {
            return Err(QuarantineError::TooFewMembers(0));
        };
        if verify_size(representative).is_err() {
            log::warn!(
                "Representative {} is missing or changed; leaving group {} untouched",
                representative.path.display(),
                group.checksum
            );
            return Err(QuarantineError::RepresentativeMissing(
                representative.path.clone(),
            ));
        }

        fs::create_dir_all(&self.quarantine_dir)
            .map_err(|e| QuarantineError::io(&self.quarantine_dir, e))?;

        let mut report = QuarantineReport::default();
        for record in group.duplicates() {
            match self.quarantine_one(record) {
                Ok(moved) => {
                    self.store.remove(&record.path)?;
                    log::info!(
                        "Quarantined {} → {}",
                        moved.original_path.display(),
                        moved.quarantine_path.display()
                    );
                    report.bytes_moved += moved.size;
                    report.moved.push(moved);
                }
                Err(e) => {
                    log::warn!("Leaving {} in place: {}", record.path.display(), e);
                    report.failures.push((record.path.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    fn quarantine_one(&self, record: &FileRecord) -> Result<QuarantineRecord, QuarantineError> {
        verify_size(record)?;

        let name = file_name_of(&record.path);
        let destination = self.free_slot(&name)?;
        move_file(&record.path, &destination)?;

        Ok(QuarantineRecord {
            original_path: record.path.clone(),
            quarantine_path: destination,
            moved_at: Utc::now(),
            size: record.size,
        })
    }

    /// Claim the first free location for `name`: the top level, then `1/`,
    /// `2/`, ... The returned path exists as an empty placeholder.
    fn free_slot(&self, name: &str) -> Result<PathBuf, QuarantineError> {
        let top = self.quarantine_dir.join(name);
        if claim(&top)? {
            return Ok(top);
        }

        let mut n: u64 = 1;
        loop {
            let dir = self.quarantine_dir.join(n.to_string());
            let candidate = dir.join(name);
            if !exists(&candidate) {
                fs::create_dir_all(&dir).map_err(|e| QuarantineError::io(&dir, e))?;
                if claim(&candidate)? {
                    return Ok(candidate);
                }
            }
            n += 1;
        }
    }

    /// Build a listing entry for a file inside the quarantine directory.
    /// Relative paths are resolved against the quarantine directory.
    ///
    /// # Errors
    ///
    /// Fails if the path is outside the quarantine directory, missing, or
    /// unreadable.
    pub fn entry(&self, path: &Path) -> Result<QuarantineEntry, QuarantineError> {
        let path = if path.is_relative() {
            self.quarantine_dir.join(path)
        } else {
            path.to_path_buf()
        };
        if !self.contains(&path) {
            return Err(QuarantineError::NotQuarantined(path));
        }

        let metadata = fs::metadata(&path).map_err(|e| QuarantineError::io(&path, e))?;
        let checksum = match self.engine.compute_checksum(&path) {
            Checksum::Digest(hash) => hash_to_hex(&hash),
            Checksum::Failed(e) => {
                return Err(QuarantineError::Io {
                    path,
                    source: io::Error::other(e.to_string()),
                })
            }
        };

        Ok(QuarantineEntry {
            name: file_name_of(&path),
            size: metadata.len(),
            checksum,
            modified: metadata
                .modified()
                .map(crate::scanner::system_time_to_secs)
                .unwrap_or(0),
            quarantine_path: path,
        })
    }

    fn contains(&self, path: &Path) -> bool {
        let base = self
            .quarantine_dir
            .canonicalize()
            .unwrap_or_else(|_| self.quarantine_dir.clone());
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        target != base && target.starts_with(&base)
    }

    /// Move a quarantined file into the restore directory.
    ///
    /// The file keeps its name unless that name is taken, in which case it
    /// becomes `name (1).ext`, `name (2).ext`, ... Nothing is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`QuarantineError::RestoreDeclined`] when `shell` does not
    /// confirm, or an I/O error if the move fails.
    pub fn restore_file(
        &self,
        entry: &QuarantineEntry,
        shell: &dyn ShellCapabilities,
    ) -> Result<RestoreResult, QuarantineError> {
        let source = &entry.quarantine_path;
        if !self.contains(source) {
            return Err(QuarantineError::NotQuarantined(source.clone()));
        }
        if !exists(source) {
            return Err(QuarantineError::NotFound(source.clone()));
        }

        let prompt = format!(
            "Restore {} to {}?",
            entry.name,
            self.restore_dir.display()
        );
        if !shell.confirm(&prompt) {
            return Err(QuarantineError::RestoreDeclined(source.clone()));
        }

        fs::create_dir_all(&self.restore_dir)
            .map_err(|e| QuarantineError::io(&self.restore_dir, e))?;

        let preferred = self.restore_dir.join(&entry.name);
        let mut destination = preferred.clone();
        while !claim(&destination)? {
            destination = auto_rename_path(&preferred);
        }
        move_file(source, &destination)?;

        // Drop an emptied numbered subdirectory; fails harmlessly if not empty.
        if let Some(parent) = source.parent() {
            if parent != self.quarantine_dir && self.contains(parent) {
                let _ = fs::remove_dir(parent);
            }
        }

        log::info!("Restored {} → {}", source.display(), destination.display());
        Ok(RestoreResult {
            from: source.clone(),
            to: destination,
            size: entry.size,
        })
    }

    /// Hash everything in the quarantine directory and group it by
    /// checksum. Singleton groups are included. The index is not consulted.
    ///
    /// # Errors
    ///
    /// Currently infallible for a missing directory (empty listing);
    /// unreadable files are skipped.
    pub fn list_quarantine(&self) -> Result<Vec<QuarantineGroup>, QuarantineError> {
        if !self.quarantine_dir.is_dir() {
            return Ok(Vec::new());
        }

        let walker = Walker::new(
            &self.quarantine_dir,
            WalkerConfig::default().with_include_empty(true),
        );

        let mut groups: BTreeMap<String, Vec<QuarantineEntry>> = BTreeMap::new();
        for result in walker.walk() {
            let file = match result {
                Ok(file) => file,
                Err(e) => {
                    log::warn!("Skipping: {}", e);
                    continue;
                }
            };
            match self.engine.compute_checksum(&file.path) {
                Checksum::Digest(hash) => {
                    let checksum = hash_to_hex(&hash);
                    groups.entry(checksum.clone()).or_default().push(QuarantineEntry {
                        name: file.name(),
                        size: file.size,
                        checksum,
                        modified: file.modified_secs(),
                        quarantine_path: file.path,
                    });
                }
                Checksum::Failed(e) => log::warn!("Skipping unreadable quarantined file: {}", e),
            }
        }

        Ok(groups
            .into_iter()
            .map(|(checksum, mut entries)| {
                entries.sort_by(|a, b| a.quarantine_path.cmp(&b.quarantine_path));
                QuarantineGroup { checksum, entries }
            })
            .collect())
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Reserve `path` by creating it empty. Returns `false` if anything is
/// already there; an existing file is never opened for writing.
fn claim(path: &Path) -> Result<bool, QuarantineError> {
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(QuarantineError::io(path, e)),
    }
}

/// Check that a file on disk still has the size its record claims.
fn verify_size(record: &FileRecord) -> Result<(), QuarantineError> {
    let actual = fs::metadata(&record.path)
        .map_err(|e| QuarantineError::io(&record.path, e))?
        .len();
    if actual != record.size {
        return Err(QuarantineError::Modified {
            path: record.path.clone(),
            expected: record.size,
            actual,
        });
    }
    Ok(())
}

/// Move a file: rename first, then copy and delete.
///
/// `destination` may be an empty placeholder left by [`claim`]; it is
/// replaced. On failure the destination is removed, so the file exists
/// exactly once.
///
/// # Errors
///
/// Returns [`QuarantineError::SourceNotRemoved`] when the copy had to be
/// rolled back, or an I/O error if neither strategy works.
pub fn move_file(source: &Path, destination: &Path) -> Result<(), QuarantineError> {
    match fs::rename(source, destination) {
        Ok(()) => return Ok(()),
        Err(e) => log::debug!(
            "Rename {} → {} failed ({}), falling back to copy",
            source.display(),
            destination.display(),
            e
        ),
    }

    fs::copy(source, destination).map_err(|e| {
        // A partial copy must not linger.
        let _ = fs::remove_file(destination);
        QuarantineError::io(source, e)
    })?;

    if let Err(e) = fs::remove_file(source) {
        if let Err(cleanup) = fs::remove_file(destination) {
            log::error!(
                "Could not remove copy {} after failed move: {}",
                destination.display(),
                cleanup
            );
        }
        return Err(QuarantineError::SourceNotRemoved {
            path: source.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

/// `name.ext` → `name (1).ext`, `name (2).ext`, ... first one not taken.
#[must_use]
pub fn auto_rename_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut i: u64 = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem} ({i}).{ext}"),
            None => format!("{stem} ({i})"),
        };
        let candidate = parent.join(name);
        if !exists(&candidate) {
            return candidate;
        }
        i += 1;
    }
}
