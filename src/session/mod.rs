//! Scan sessions: lifecycle, progress snapshots and the coordinator.
//!
//! # Architecture
//!
//! * [`state`]: The [`ScanStatus`] state machine and the immutable
//!   [`ScanSnapshot`] published to consumers.
//! * [`coordinator`]: The [`ScanCoordinator`] that runs the pipeline.

pub mod coordinator;
pub mod state;

pub use coordinator::{
    CoordinatorConfig, CoordinatorError, ScanCoordinator, ScanHandle, ScanObserver, ScanOutcome,
    ScanRequest, ScanSummary, DEFAULT_PROGRESS_INTERVAL, POLL_INTERVAL,
};
pub use state::{ScanEvent, ScanSnapshot, ScanStatus, TransitionError};
