//! Index row definitions.

use std::cmp::Ordering;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scanner::{hash_to_hex, FileEntry, Hash};

/// One hashed file in the index.
///
/// `path` is the unique key; writing a record for an existing path
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// File name component.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, seconds since the UNIX epoch.
    pub modified: i64,
    /// BLAKE3 content hash, lowercase hex.
    pub checksum: String,
}

impl FileRecord {
    /// Build a record from a walked file and its digest.
    #[must_use]
    pub fn from_entry(entry: &FileEntry, hash: &Hash) -> Self {
        Self {
            path: entry.path.clone(),
            name: entry.name(),
            size: entry.size,
            modified: entry.modified_secs(),
            checksum: hash_to_hex(hash),
        }
    }

    /// Ordering that puts the representative first: oldest modification
    /// time, then lexical path order.
    #[must_use]
    pub fn representative_cmp(&self, other: &Self) -> Ordering {
        self.modified
            .cmp(&other.modified)
            .then_with(|| self.path.cmp(&other.path))
    }
}
