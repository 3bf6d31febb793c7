//! Process-wide store handle.
//!
//! `initialize` is meant to be called once from `main`, before any
//! coordinator or quarantine manager is built. Everything else either
//! calls [`get`] or takes an explicit `Arc<DuplicateStore>`.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use super::database::{DuplicateStore, StoreError, StoreResult};

static STORE: OnceLock<Mutex<Option<Arc<DuplicateStore>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<DuplicateStore>>> {
    STORE.get_or_init(|| Mutex::new(None))
}

/// Open the store at `path` and install it as the process-wide handle.
///
/// # Errors
///
/// Returns [`StoreError::AlreadyInitialized`] if a store is installed, or
/// any error from opening the database.
pub fn initialize(path: &Path) -> StoreResult<Arc<DuplicateStore>> {
    let mut guard = slot().lock().map_err(|_| StoreError::Poisoned)?;
    if guard.is_some() {
        return Err(StoreError::AlreadyInitialized);
    }
    let store = Arc::new(DuplicateStore::open_or_recreate(path)?);
    *guard = Some(Arc::clone(&store));
    Ok(store)
}

/// Shared handle to the installed store.
///
/// # Errors
///
/// Returns [`StoreError::NotInitialized`] before [`initialize`] or after
/// [`shutdown`].
pub fn get() -> StoreResult<Arc<DuplicateStore>> {
    let guard = slot().lock().map_err(|_| StoreError::Poisoned)?;
    guard.clone().ok_or(StoreError::NotInitialized)
}

/// Close and uninstall the process-wide store. A no-op if none is installed.
///
/// Outstanding handles see [`StoreError::Closed`] afterwards.
///
/// # Errors
///
/// Returns a [`StoreError`] if the connection fails to close.
pub fn shutdown() -> StoreResult<()> {
    let store = slot().lock().map_err(|_| StoreError::Poisoned)?.take();
    match store {
        Some(store) => store.close(),
        None => Ok(()),
    }
}
