//! Process exit codes and machine-readable errors.

use serde::Serialize;

use crate::session::{ScanOutcome, ScanStatus};

/// Exit codes for the dupevault binary.
///
/// - 0: duplicates found
/// - 1: error
/// - 2: no duplicates found
/// - 3: completed, but some files could not be hashed
/// - 130: interrupted (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Duplicates were found.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates were found.
    NoDuplicates = 2,
    /// Completed with per-file failures.
    PartialSuccess = 3,
    /// Interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DV000",
            Self::GeneralError => "DV001",
            Self::NoDuplicates => "DV002",
            Self::PartialSuccess => "DV003",
            Self::Interrupted => "DV130",
        }
    }

    /// Exit code for a finished scan.
    #[must_use]
    pub fn from_outcome(outcome: &ScanOutcome) -> Self {
        match outcome.status() {
            ScanStatus::Cancelled => Self::Interrupted,
            ScanStatus::Completed if outcome.summary.failed > 0 => Self::PartialSuccess,
            ScanStatus::Completed if outcome.groups.is_empty() => Self::NoDuplicates,
            ScanStatus::Completed => Self::Success,
            ScanStatus::Idle | ScanStatus::Scanning | ScanStatus::Error => Self::GeneralError,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DV001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
