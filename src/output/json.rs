//! JSON output formatter for scan results and quarantine listings.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "status": "completed",
//!   "root": "/data/photos",
//!   "duplicates": [
//!     {
//!       "checksum": "abc123...",
//!       "size": 1024,
//!       "count": 2,
//!       "wasted_space": 1024,
//!       "files": [
//!         { "path": "/data/photos/a.jpg", "modified": "2024-01-01T00:00:00Z", "keep": true },
//!         { "path": "/data/photos/b.jpg", "modified": "2024-02-01T00:00:00Z", "keep": false }
//!       ]
//!     }
//!   ],
//!   "summary": {
//!     "candidates": 100,
//!     "hashed": 40,
//!     "failed": 0,
//!     "skipped_by_size": 60,
//!     "duplicate_groups": 1,
//!     "reclaimable_space": 1024,
//!     "scan_duration_ms": 1234,
//!     "exit_code": 0,
//!     "exit_code_name": "DV000"
//!   }
//! }
//! ```

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::duplicates::DuplicateGroup;
use crate::error::ExitCode;
use crate::session::{ScanStatus, ScanSummary};
use crate::store::FileRecord;

/// One member of a duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFile {
    /// Absolute path
    pub path: String,
    /// Last modified time (RFC 3339), when representable
    pub modified: Option<String>,
    /// Whether this is the representative that is kept
    pub keep: bool,
}

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// BLAKE3 hash as hexadecimal string (64 characters)
    pub checksum: String,
    /// Size of each member in bytes
    pub size: u64,
    /// Number of members
    pub count: usize,
    /// Bytes reclaimable by keeping only the representative
    pub wasted_space: u64,
    /// Members, representative first
    pub files: Vec<JsonFile>,
}

impl JsonDuplicateGroup {
    /// Convert a duplicate group.
    #[must_use]
    pub fn from_duplicate_group(group: &DuplicateGroup) -> Self {
        let keep = group.representative_index();
        Self {
            checksum: group.checksum.clone(),
            size: group.representative().map_or(0, |r| r.size),
            count: group.count(),
            wasted_space: group.wasted_space(),
            files: group
                .files
                .iter()
                .enumerate()
                .map(|(i, f)| JsonFile {
                    path: f.path.to_string_lossy().into_owned(),
                    modified: format_modified(f),
                    keep: Some(i) == keep,
                })
                .collect(),
        }
    }
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Files the walker produced
    pub candidates: usize,
    /// Files hashed successfully
    pub hashed: usize,
    /// Files that could not be hashed
    pub failed: usize,
    /// Files dropped by size without hashing
    pub skipped_by_size: usize,
    /// Number of duplicate groups
    pub duplicate_groups: usize,
    /// Total space that can be reclaimed (bytes)
    pub reclaimable_space: u64,
    /// Duration of the scan in milliseconds
    pub scan_duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DV000")
    pub exit_code_name: String,
}

impl JsonSummary {
    /// Create a JSON summary from a scan summary and an exit code.
    #[must_use]
    pub fn from_scan_summary(summary: &ScanSummary, exit_code: ExitCode) -> Self {
        Self {
            candidates: summary.candidates,
            hashed: summary.hashed,
            failed: summary.failed,
            skipped_by_size: summary.skipped_by_size,
            duplicate_groups: summary.duplicate_groups,
            reclaimable_space: summary.wasted_space,
            scan_duration_ms: u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output for a scan.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Final session status
    pub status: ScanStatus,
    /// Scanned root
    pub root: Option<String>,
    /// List of duplicate groups
    pub duplicates: Vec<JsonDuplicateGroup>,
    /// Scan summary statistics; absent when only stored groups are listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JsonSummary>,
}

impl JsonOutput {
    /// Output for a finished scan.
    #[must_use]
    pub fn new(
        status: ScanStatus,
        root: Option<&std::path::Path>,
        groups: &[DuplicateGroup],
        summary: &ScanSummary,
        exit_code: ExitCode,
    ) -> Self {
        Self {
            status,
            root: root.map(|r| r.to_string_lossy().into_owned()),
            duplicates: groups
                .iter()
                .map(JsonDuplicateGroup::from_duplicate_group)
                .collect(),
            summary: Some(JsonSummary::from_scan_summary(summary, exit_code)),
        }
    }

    /// Output for groups read back from the index.
    #[must_use]
    pub fn from_groups(root: Option<&std::path::Path>, groups: &[DuplicateGroup]) -> Self {
        Self {
            status: ScanStatus::Completed,
            root: root.map(|r| r.to_string_lossy().into_owned()),
            duplicates: groups
                .iter()
                .map(JsonDuplicateGroup::from_duplicate_group)
                .collect(),
            summary: None,
        }
    }

    /// Write JSON to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(self, writer, pretty)
    }
}

/// Serialize any value as JSON followed by a newline.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<T: Serialize, W: Write>(
    value: &T,
    writer: &mut W,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, value)?;
    } else {
        serde_json::to_writer(&mut *writer, value)?;
    }
    writer.write_all(b"\n")?;
    Ok(())
}

fn format_modified(record: &FileRecord) -> Option<String> {
    DateTime::<Utc>::from_timestamp(record.modified, 0).map(|t| t.to_rfc3339())
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
