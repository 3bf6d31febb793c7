//! File actions module.
//!
//! This module provides functionality for:
//! - Moving redundant duplicates into a recoverable quarantine
//! - Listing and restoring quarantined files
//! - Shell integration (directory choice, reveal, open, confirmation)
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use dupevault::actions::QuarantineManager;
//! use dupevault::store::DuplicateStore;
//!
//! let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
//! let manager = QuarantineManager::new(
//!     Arc::clone(&store),
//!     PathBuf::from("/tmp/quarantine"),
//!     PathBuf::from("/tmp/restored"),
//! );
//! for group in store.duplicate_groups(None).unwrap() {
//!     let report = manager.delete_group_duplicates(&group).unwrap();
//!     println!("{}", report.summary());
//! }
//! ```

pub mod quarantine;
pub mod shell;

pub use quarantine::{
    auto_rename_path, move_file, QuarantineEntry, QuarantineError, QuarantineGroup,
    QuarantineManager, QuarantineRecord, QuarantineReport, RestoreResult,
};
pub use shell::{RecordingShell, ShellCall, ShellCapabilities, ShellError, SystemShell};
