//! Size pruning and duplicate groups.
//!
//! # Overview
//!
//! * [`SizeIndexer`]: the quick-scan heuristic. Files whose size no other
//!   candidate shares are dropped before they are ever hashed.
//! * [`DuplicateGroup`]: stored records sharing a content checksum. The
//!   oldest member (ties broken by path) is the representative that is
//!   always kept.
//!
//! # Example
//!
//! ```
//! use dupevault::scanner::FileEntry;
//! use dupevault::duplicates::SizeIndexer;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileEntry::new(PathBuf::from("/file1.txt"), 1024, SystemTime::now()),
//!     FileEntry::new(PathBuf::from("/file2.txt"), 1024, SystemTime::now()),
//!     FileEntry::new(PathBuf::from("/file3.txt"), 2048, SystemTime::now()),
//! ];
//!
//! // Only sizes with 2+ files are potential duplicates
//! let outcome = SizeIndexer::new(true, 2).prune(files);
//!
//! assert_eq!(outcome.stats.total_files, 3);
//! assert_eq!(outcome.stats.potential_duplicates, 2);
//! assert_eq!(outcome.skipped(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::scanner::FileEntry;
use crate::store::FileRecord;

/// Candidate count above which quick scan prunes by size.
pub const DEFAULT_QUICK_SCAN_THRESHOLD: usize = 100;

/// Statistics from size pruning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupingStats {
    /// Total number of files processed
    pub total_files: usize,
    /// Total size of all files in bytes
    pub total_size: u64,
    /// Number of distinct file sizes
    pub unique_sizes: usize,
    /// Number of files that could be duplicates (in groups of 2+)
    pub potential_duplicates: usize,
    /// Number of files eliminated as unique (singleton sizes)
    pub eliminated_unique: usize,
    /// Number of size groups with 2+ files
    pub duplicate_groups: usize,
}

impl GroupingStats {
    /// Percentage of files eliminated by size grouping.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Result of running candidates through the [`SizeIndexer`].
#[derive(Debug, Clone)]
pub struct PruneOutcome {
    /// Files that still need hashing, in their original order.
    pub kept: Vec<FileEntry>,
    /// Whether size pruning actually ran.
    pub applied: bool,
    /// Grouping statistics (default when pruning did not run).
    pub stats: GroupingStats,
}

impl PruneOutcome {
    /// Number of files dropped without hashing.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.stats.eliminated_unique
    }
}

/// Quick-scan heuristic: drop files whose size no other candidate shares.
///
/// Files of different sizes cannot be byte-identical, so pruning never
/// changes the final duplicate set. It only runs when enabled and when the
/// candidate list is larger than the threshold; small trees are hashed in
/// full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeIndexer {
    enabled: bool,
    threshold: usize,
}

impl Default for SizeIndexer {
    fn default() -> Self {
        Self::new(true, DEFAULT_QUICK_SCAN_THRESHOLD)
    }
}

impl SizeIndexer {
    /// Create an indexer.
    #[must_use]
    pub fn new(enabled: bool, threshold: usize) -> Self {
        Self { enabled, threshold }
    }

    /// Whether pruning runs for this many candidates.
    #[must_use]
    pub fn applies_to(&self, candidates: usize) -> bool {
        self.enabled && candidates > self.threshold
    }

    /// Prune `files` if the heuristic applies, preserving walk order.
    #[must_use]
    pub fn prune(&self, files: Vec<FileEntry>) -> PruneOutcome {
        if !self.applies_to(files.len()) {
            return PruneOutcome {
                kept: files,
                applied: false,
                stats: GroupingStats::default(),
            };
        }

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for file in &files {
            *counts.entry(file.size).or_default() += 1;
        }

        let mut stats = GroupingStats {
            total_files: files.len(),
            unique_sizes: counts.len(),
            ..GroupingStats::default()
        };
        stats.duplicate_groups = counts.values().filter(|&&n| n > 1).count();

        let kept: Vec<FileEntry> = files
            .into_iter()
            .filter(|f| {
                stats.total_size += f.size;
                counts.get(&f.size).copied().unwrap_or(0) > 1
            })
            .collect();

        stats.potential_duplicates = kept.len();
        stats.eliminated_unique = stats.total_files - kept.len();

        log::info!(
            "Quick scan: {} files → {} candidates ({:.1}% eliminated by size)",
            stats.total_files,
            stats.potential_duplicates,
            stats.elimination_rate()
        );

        PruneOutcome {
            kept,
            applied: true,
            stats,
        }
    }
}

/// Confirmed group of byte-identical files.
///
/// [`from_records`](Self::from_records) orders members oldest first, ties
/// broken by path. The representative is computed from the members rather
/// than their position, so a group built or deserialized in another order
/// still keeps its oldest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// BLAKE3 content hash shared by every member, lowercase hex
    pub checksum: String,
    /// Members, normally representative first
    pub files: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Build a group from records, sorting them into representative order.
    #[must_use]
    pub fn from_records(mut files: Vec<FileRecord>) -> Self {
        files.sort_by(FileRecord::representative_cmp);
        let checksum = files
            .first()
            .map(|f| f.checksum.clone())
            .unwrap_or_default();
        Self { checksum, files }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all files in this group.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Space reclaimable by keeping only the representative.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.representative()
            .map_or(0, |r| self.total_size().saturating_sub(r.size))
    }

    /// Position of the representative in `files`.
    #[must_use]
    pub fn representative_index(&self) -> Option<usize> {
        self.files
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.representative_cmp(b))
            .map(|(i, _)| i)
    }

    /// The member that is always kept: the oldest, ties broken by path.
    #[must_use]
    pub fn representative(&self) -> Option<&FileRecord> {
        self.representative_index().map(|i| &self.files[i])
    }

    /// Members other than the representative, in stored order.
    #[must_use]
    pub fn duplicates(&self) -> Vec<&FileRecord> {
        let keep = self.representative_index();
        self.files
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != keep)
            .map(|(_, f)| f)
            .collect()
    }

    /// Get just the paths of files in this group.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}
