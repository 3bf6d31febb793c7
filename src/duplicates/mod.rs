//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-based candidate pruning (the quick-scan heuristic)
//! - Duplicate group management

pub mod groups;

pub use groups::{
    DuplicateGroup, GroupingStats, PruneOutcome, SizeIndexer, DEFAULT_QUICK_SCAN_THRESHOLD,
};
