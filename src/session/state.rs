//! Scan lifecycle states and the immutable progress snapshot.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Lifecycle status of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// No session has run yet.
    #[default]
    Idle,
    /// A session is walking or hashing.
    Scanning,
    /// Every candidate was processed; results are available.
    Completed,
    /// The session stopped on request; partial data is discarded.
    Cancelled,
    /// The store failed; no results are surfaced.
    Error,
}

/// Something that moves a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// A new session begins.
    Start,
    /// Cancellation was observed.
    Cancel,
    /// The last candidate was processed.
    AllProcessed,
    /// The store reported an error.
    StoreFailure,
}

/// A state/event pair the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid scan transition: {event:?} while {from}")]
pub struct TransitionError {
    /// State the session was in
    pub from: ScanStatus,
    /// Event that was rejected
    pub event: ScanEvent,
}

impl ScanStatus {
    /// Apply an event, returning the next state.
    ///
    /// Within one session, status only moves forward: `Scanning` is left
    /// exactly once, and a terminal state is only left by starting a new
    /// session.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for any pair not in the lifecycle.
    pub fn transition(self, event: ScanEvent) -> Result<Self, TransitionError> {
        use ScanEvent as E;
        use ScanStatus as S;

        match (self, event) {
            (S::Idle | S::Completed | S::Cancelled | S::Error, E::Start) => Ok(S::Scanning),
            (S::Scanning, E::Cancel) => Ok(S::Cancelled),
            (S::Scanning, E::AllProcessed) => Ok(S::Completed),
            (S::Scanning, E::StoreFailure) => Ok(S::Error),
            (from, event) => Err(TransitionError { from, event }),
        }
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    /// Whether a session is in progress.
    #[must_use]
    pub fn is_running(self) -> bool {
        self == Self::Scanning
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Immutable view of a scan session at one point in time.
///
/// A new value is published after every processed file and on every status
/// change. Consumers never see a snapshot change underneath them.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScanSnapshot {
    /// Session number, increasing per coordinator. 0 before the first start.
    pub session_id: u64,
    /// Scanned root (canonical).
    pub root: Option<PathBuf>,
    /// Extension allow-set; empty accepts every file.
    pub extensions: BTreeSet<String>,
    /// Whether the size heuristic was requested.
    pub quick_scan: bool,
    /// Lifecycle status.
    pub status: ScanStatus,
    /// Files whose hashing finished (success or failure).
    pub processed: usize,
    /// Files selected for hashing.
    pub total: usize,
    /// File most recently processed.
    pub current_file: Option<PathBuf>,
    /// Duplicate groups under the root, refreshed periodically.
    pub duplicate_count: usize,
    /// Files that could not be hashed.
    pub failed: usize,
    /// Files dropped by the size heuristic without hashing.
    pub skipped_by_size: usize,
    /// Store error, when `status` is `Error`.
    pub error_message: Option<String>,
}

impl ScanSnapshot {
    /// Fraction of candidates processed, in `0.0..=1.0`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f64 / self.total as f64).min(1.0)
        }
    }
}
