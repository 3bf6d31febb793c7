//! Ctrl+C handling.
//!
//! A [`ShutdownHandler`] records that an interrupt arrived and forwards it
//! to the attached [`ScanCoordinator`], which cancels its running session.
//! The binary then exits with [`EXIT_CODE_INTERRUPTED`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dupevault::session::{CoordinatorConfig, ScanCoordinator};
//! use dupevault::signal::install_handler;
//! use dupevault::store::DuplicateStore;
//!
//! let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
//! let coordinator = ScanCoordinator::new(store, CoordinatorConfig::default()).unwrap();
//! let handler = install_handler().expect("Failed to install signal handler");
//! handler.attach(&coordinator);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::session::ScanCoordinator;

/// Exit code for SIGINT (Ctrl+C) interruption: 128 + SIGINT.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared interrupt state.
///
/// Clones share the flag and the attached coordinator.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
    target: Arc<Mutex<Option<ScanCoordinator>>>,
}

impl ShutdownHandler {
    /// Create a handler with no interrupt recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward future interrupts to `coordinator`.
    pub fn attach(&self, coordinator: &ScanCoordinator) {
        if let Ok(mut target) = self.target.lock() {
            *target = Some(coordinator.clone());
        }
    }

    /// Check if an interrupt was received.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Record an interrupt and cancel the attached coordinator's session.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Ok(target) = self.target.lock() {
            if let Some(coordinator) = target.as_ref() {
                coordinator.cancel();
            }
        }
    }

    /// Clear the interrupt flag and detach the coordinator.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        if let Ok(mut target) = self.target.lock() {
            *target = None;
        }
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process Ctrl+C hook and return its handler.
///
/// The hook can only be registered once per process; later calls reset and
/// return the same handler.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if another hook was registered
/// outside this module.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = GLOBAL_HANDLER.get_or_init(ShutdownHandler::new).clone();
    let hook = handler.clone();
    ctrlc::set_handler(move || {
        hook.request_shutdown();
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Stopping scan...");
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");
    })?;
    Ok(handler)
}
