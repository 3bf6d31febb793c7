//! Scan session orchestration.
//!
//! # Overview
//!
//! A [`ScanCoordinator`] drives one scan at a time through
//! walk → prune → hash → persist → classify:
//!
//! 1. A producer thread walks the root and streams [`FileEntry`] values
//!    through a bounded channel.
//! 2. The [`SizeIndexer`] drops files with a unique size when quick scan
//!    applies.
//! 3. Checksums run on a dedicated rayon pool; results come back over a
//!    channel that the coordinator polls so cancellation stays responsive.
//! 4. Every result is written to the [`DuplicateStore`] from the
//!    coordinator thread, then a fresh [`ScanSnapshot`] is published.
//!
//! Snapshots reach consumers two ways: synchronously through registered
//! [`ScanObserver`]s (on the coordinator thread) and asynchronously through
//! [`ScanCoordinator::subscribe`] channels.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dupevault::session::{CoordinatorConfig, ScanCoordinator, ScanRequest};
//! use dupevault::store::DuplicateStore;
//!
//! let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
//! let coordinator = ScanCoordinator::new(store, CoordinatorConfig::default()).unwrap();
//! let outcome = coordinator.run(ScanRequest::new("/home/user/Pictures")).unwrap();
//! println!("{} duplicate groups", outcome.groups.len());
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;

use super::state::{ScanEvent, ScanSnapshot, ScanStatus, TransitionError};
use crate::duplicates::{DuplicateGroup, GroupingStats, SizeIndexer, DEFAULT_QUICK_SCAN_THRESHOLD};
use crate::scanner::{
    normalize_extensions, Checksum, ChecksumEngine, FileEntry, Hasher, Walker, WalkerConfig,
};
use crate::store::{DuplicateStore, FileRecord, StoreError};

/// How long the coordinator waits for a checksum before re-checking
/// cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default number of processed files between duplicate-count refreshes.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// Errors that stop a session from starting or finishing.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The scan root does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The scan root is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The scan root could not be resolved.
    #[error("Cannot access {path}: {source}")]
    InvalidRoot {
        /// Requested root
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The store failed mid-session. The session ended in `Error`.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The lifecycle rejected a transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The hashing pool could not be created.
    #[error("Failed to create hashing pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The session thread could not be spawned.
    #[error("Failed to spawn scan thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The session thread panicked.
    #[error("Scan thread panicked")]
    Panicked,
}

/// Receives every snapshot synchronously on the coordinator thread.
///
/// Implementations should return quickly; the pipeline waits for them.
pub trait ScanObserver: Send + Sync {
    /// Called after each published snapshot.
    fn on_snapshot(&self, snapshot: &ScanSnapshot);
}

/// Tuning knobs that stay fixed for the coordinator's lifetime.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Candidate count above which quick scan prunes by size
    pub quick_scan_threshold: usize,
    /// Hashing worker threads (minimum 1)
    pub hash_threads: usize,
    /// Processed files between duplicate-count refreshes (minimum 1)
    pub progress_interval: usize,
    /// Skip hidden files and directories
    pub skip_hidden: bool,
    /// Include zero-byte files
    pub include_empty: bool,
    /// Directories never walked (e.g. the quarantine directory)
    pub exclude: Vec<PathBuf>,
    /// Capacity of the walker → coordinator channel
    pub walk_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            quick_scan_threshold: DEFAULT_QUICK_SCAN_THRESHOLD,
            hash_threads: 1,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            skip_hidden: false,
            include_empty: false,
            exclude: Vec::new(),
            walk_buffer: 1024,
        }
    }
}

impl CoordinatorConfig {
    /// Set the quick-scan threshold.
    #[must_use]
    pub fn with_quick_scan_threshold(mut self, threshold: usize) -> Self {
        self.quick_scan_threshold = threshold;
        self
    }

    /// Set the number of hashing threads.
    #[must_use]
    pub fn with_hash_threads(mut self, threads: usize) -> Self {
        self.hash_threads = threads.max(1);
        self
    }

    /// Set the duplicate-count refresh period.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Enable/disable hidden file skipping.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Enable/disable zero-byte files.
    #[must_use]
    pub fn with_include_empty(mut self, include: bool) -> Self {
        self.include_empty = include;
        self
    }

    /// Add a directory that is never walked.
    #[must_use]
    pub fn with_exclude(mut self, dir: PathBuf) -> Self {
        self.exclude.push(dir);
        self
    }
}

/// Parameters of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// Directory to scan
    pub root: PathBuf,
    /// Extension allow-set; empty accepts every file
    pub extensions: BTreeSet<String>,
    /// Enable the size heuristic
    pub quick_scan: bool,
}

impl ScanRequest {
    /// Scan `root` for every extension with quick scan enabled.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: BTreeSet::new(),
            quick_scan: true,
        }
    }

    /// Restrict the scan to these extensions (normalized).
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = normalize_extensions(extensions);
        self
    }

    /// Enable/disable quick scan.
    #[must_use]
    pub fn with_quick_scan(mut self, quick_scan: bool) -> Self {
        self.quick_scan = quick_scan;
        self
    }
}

/// Totals for a finished session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
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
    /// Bytes reclaimable across all groups
    pub wasted_space: u64,
    /// Wall-clock duration of the session
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// Size-pruning statistics, when quick scan applied
    pub pruning: Option<GroupingStats>,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Final state of a session.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Last snapshot published by the session
    pub snapshot: ScanSnapshot,
    /// Duplicate groups; empty unless the session completed
    pub groups: Vec<DuplicateGroup>,
    /// Session totals
    pub summary: ScanSummary,
}

impl ScanOutcome {
    /// Shorthand for `snapshot.status`.
    #[must_use]
    pub fn status(&self) -> ScanStatus {
        self.snapshot.status
    }
}

/// Handle to a session running on a background thread.
#[derive(Debug)]
pub struct ScanHandle {
    session_id: u64,
    thread: JoinHandle<Result<ScanOutcome, CoordinatorError>>,
}

impl ScanHandle {
    /// Session this handle belongs to.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Whether the session thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the session reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the session's error, or [`CoordinatorError::Panicked`].
    pub fn wait(self) -> Result<ScanOutcome, CoordinatorError> {
        self.thread.join().map_err(|_| CoordinatorError::Panicked)?
    }
}

struct SessionState {
    snapshot: ScanSnapshot,
    cancel: Arc<AtomicBool>,
    results: Option<Vec<DuplicateGroup>>,
    next_session: u64,
}

struct Inner {
    store: Arc<DuplicateStore>,
    engine: Arc<dyn ChecksumEngine>,
    config: CoordinatorConfig,
    pool: rayon::ThreadPool,
    state: Mutex<SessionState>,
    // Held for the whole of a session; serializes sessions.
    running: Mutex<()>,
    subscribers: Mutex<Vec<Sender<ScanSnapshot>>>,
    observers: Mutex<Vec<Arc<dyn ScanObserver>>>,
}

/// Orchestrates scan sessions over one store.
///
/// Cloning is cheap and every clone drives the same sessions, so a clone can
/// be handed to a signal handler to cancel the running scan.
#[derive(Clone)]
pub struct ScanCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("config", &self.inner.config)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScanCoordinator {
    /// Create a coordinator hashing with BLAKE3.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::ThreadPool`] if the hashing pool cannot
    /// be created.
    pub fn new(
        store: Arc<DuplicateStore>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        Self::with_engine(store, config, Arc::new(Hasher::new()))
    }

    /// Create a coordinator with a custom checksum engine.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::ThreadPool`] if the hashing pool cannot
    /// be created.
    pub fn with_engine(
        store: Arc<DuplicateStore>,
        config: CoordinatorConfig,
        engine: Arc<dyn ChecksumEngine>,
    ) -> Result<Self, CoordinatorError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.hash_threads.max(1))
            .thread_name(|i| format!("dupevault-hash-{i}"))
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                engine,
                config,
                pool,
                state: Mutex::new(SessionState {
                    snapshot: ScanSnapshot::default(),
                    cancel: Arc::new(AtomicBool::new(false)),
                    results: None,
                    next_session: 1,
                }),
                running: Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
                observers: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The store this coordinator writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<DuplicateStore> {
        &self.inner.store
    }

    /// Register an observer called on the coordinator thread for every
    /// snapshot.
    pub fn add_observer(&self, observer: Arc<dyn ScanObserver>) {
        lock(&self.inner.observers).push(observer);
    }

    /// Receive every snapshot published from now on.
    ///
    /// Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<ScanSnapshot> {
        let (tx, rx) = crossbeam_channel::unbounded();
        lock(&self.inner.subscribers).push(tx);
        rx
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ScanSnapshot {
        lock(&self.inner.state).snapshot.clone()
    }

    /// Groups of the last completed session. `None` while scanning and
    /// after a cancelled or failed session.
    #[must_use]
    pub fn results(&self) -> Option<Vec<DuplicateGroup>> {
        lock(&self.inner.state).results.clone()
    }

    /// Request cancellation of the running session. A no-op when idle.
    pub fn cancel(&self) {
        let state = lock(&self.inner.state);
        if !state.cancel.swap(true, Ordering::SeqCst) {
            log::info!("Cancellation requested for session {}", state.snapshot.session_id);
        }
    }

    /// Start a session on a background thread.
    ///
    /// A running session is cancelled first; the new one begins once it has
    /// stopped.
    ///
    /// # Errors
    ///
    /// Fails if the root is invalid or the thread cannot be spawned.
    pub fn start(&self, request: ScanRequest) -> Result<ScanHandle, CoordinatorError> {
        let root = validate_root(&request.root)?;
        let (session_id, cancel) = self.begin_session();

        let this = self.clone();
        let thread = std::thread::Builder::new()
            .name(format!("dupevault-scan-{session_id}"))
            .spawn(move || this.execute(session_id, root, request, cancel))
            .map_err(CoordinatorError::Spawn)?;

        Ok(ScanHandle { session_id, thread })
    }

    /// Run a session on the calling thread.
    ///
    /// # Errors
    ///
    /// Fails if the root is invalid or the store fails mid-session. A
    /// cancelled session is not an error.
    pub fn run(&self, request: ScanRequest) -> Result<ScanOutcome, CoordinatorError> {
        let root = validate_root(&request.root)?;
        let (session_id, cancel) = self.begin_session();
        self.execute(session_id, root, request, cancel)
    }

    /// Allocate a session id and a fresh cancellation token, cancelling the
    /// token of any session still running.
    fn begin_session(&self) -> (u64, Arc<AtomicBool>) {
        let mut state = lock(&self.inner.state);
        state.cancel.store(true, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        state.cancel = Arc::clone(&cancel);
        let id = state.next_session;
        state.next_session += 1;
        (id, cancel)
    }

    fn execute(
        &self,
        session_id: u64,
        root: PathBuf,
        request: ScanRequest,
        cancel: Arc<AtomicBool>,
    ) -> Result<ScanOutcome, CoordinatorError> {
        let _running = lock(&self.inner.running);

        // Superseded while queued; a newer session owns the snapshot, the
        // results and the rows under its root.
        if is_cancelled(&cancel) {
            log::debug!("Session {} superseded before it started", session_id);
            return Ok(ScanOutcome {
                snapshot: ScanSnapshot {
                    session_id,
                    root: Some(root),
                    extensions: request.extensions,
                    quick_scan: request.quick_scan,
                    status: ScanStatus::Cancelled,
                    ..ScanSnapshot::default()
                },
                groups: Vec::new(),
                summary: ScanSummary::default(),
            });
        }

        let started = Instant::now();

        log::info!("Session {} scanning {}", session_id, root.display());

        self.update(|s, results| {
            let status = s.status.transition(ScanEvent::Start)?;
            *results = None;
            *s = ScanSnapshot {
                session_id,
                root: Some(root.clone()),
                extensions: request.extensions.clone(),
                quick_scan: request.quick_scan,
                status,
                ..ScanSnapshot::default()
            };
            Ok(())
        })?;

        let mut summary = ScanSummary::default();
        let result = self.pipeline(&root, &request, &cancel, &mut summary);
        summary.elapsed = started.elapsed();

        match result {
            Ok(Some(groups)) => {
                summary.duplicate_groups = groups.len();
                summary.wasted_space = groups.iter().map(DuplicateGroup::wasted_space).sum();
                let snapshot = self.update(|s, results| {
                    s.status = s.status.transition(ScanEvent::AllProcessed)?;
                    s.duplicate_count = groups.len();
                    *results = Some(groups.clone());
                    Ok(())
                })?;
                log::info!(
                    "Session {} completed: {} files hashed, {} duplicate groups in {:.2?}",
                    session_id,
                    summary.hashed,
                    summary.duplicate_groups,
                    summary.elapsed
                );
                Ok(ScanOutcome {
                    snapshot,
                    groups,
                    summary,
                })
            }
            Ok(None) => {
                let snapshot = self.update(|s, _| {
                    s.status = s.status.transition(ScanEvent::Cancel)?;
                    Ok(())
                })?;
                log::info!(
                    "Session {} cancelled after {} of {} files",
                    session_id,
                    snapshot.processed,
                    snapshot.total
                );
                Ok(ScanOutcome {
                    snapshot,
                    groups: Vec::new(),
                    summary,
                })
            }
            Err(e) => {
                log::error!("Session {} failed: {}", session_id, e);
                let message = e.to_string();
                self.update(|s, _| {
                    s.status = s.status.transition(ScanEvent::StoreFailure)?;
                    s.error_message = Some(message);
                    Ok(())
                })?;
                Err(e.into())
            }
        }
    }

    /// Walk, prune, hash and classify. `Ok(None)` means cancelled.
    fn pipeline(
        &self,
        root: &Path,
        request: &ScanRequest,
        cancel: &Arc<AtomicBool>,
        summary: &mut ScanSummary,
    ) -> Result<Option<Vec<DuplicateGroup>>, StoreError> {
        let store = &self.inner.store;

        let cleared = store.clear_root(root)?;
        if cleared > 0 {
            log::debug!("Discarded {} stale record(s) under {}", cleared, root.display());
        }

        let candidates = self.enumerate(root, request, cancel);
        if is_cancelled(cancel) {
            return Ok(None);
        }
        summary.candidates = candidates.len();

        let indexer = SizeIndexer::new(request.quick_scan, self.inner.config.quick_scan_threshold);
        let pruned = indexer.prune(candidates);
        summary.skipped_by_size = pruned.skipped();
        if pruned.applied {
            summary.pruning = Some(pruned.stats.clone());
        }

        let skipped = pruned.skipped();
        let total = pruned.kept.len();
        self.publish_with(|s| {
            s.total = total;
            s.skipped_by_size = skipped;
        });

        if !self.hash_all(root, pruned.kept, cancel, summary)? {
            return Ok(None);
        }

        store.duplicate_groups(Some(root)).map(Some)
    }

    /// Collect candidates from a walker running on a producer thread.
    fn enumerate(
        &self,
        root: &Path,
        request: &ScanRequest,
        cancel: &Arc<AtomicBool>,
    ) -> Vec<FileEntry> {
        let config = &self.inner.config;
        let walker_config = WalkerConfig {
            extensions: request.extensions.clone(),
            skip_hidden: config.skip_hidden,
            include_empty: config.include_empty,
            exclude: config.exclude.clone(),
        };
        let walker = Walker::new(root, walker_config).with_shutdown_flag(Arc::clone(cancel));
        let (tx, rx) = crossbeam_channel::bounded::<FileEntry>(config.walk_buffer.max(1));

        std::thread::scope(|scope| {
            scope.spawn(move || {
                for result in walker.walk() {
                    match result {
                        Ok(entry) => {
                            if tx.send(entry).is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("Skipping: {}", e),
                    }
                }
            });

            let files: Vec<FileEntry> = rx.iter().collect();
            log::debug!("Walker produced {} candidate(s)", files.len());
            files
        })
    }

    /// Hash every file and persist the results. Returns `false` if the
    /// session was cancelled before all files were processed.
    fn hash_all(
        &self,
        root: &Path,
        files: Vec<FileEntry>,
        cancel: &Arc<AtomicBool>,
        summary: &mut ScanSummary,
    ) -> Result<bool, StoreError> {
        let store = &self.inner.store;
        let interval = self.inner.config.progress_interval.max(1);
        let window = self.inner.config.hash_threads.max(1) * 2;

        let (tx, rx) = crossbeam_channel::unbounded::<(FileEntry, Checksum)>();
        let mut pending = files.into_iter();
        let mut in_flight = 0usize;
        let mut processed = 0usize;

        loop {
            while in_flight < window && !is_cancelled(cancel) {
                let Some(entry) = pending.next() else { break };
                let engine = Arc::clone(&self.inner.engine);
                let tx = tx.clone();
                self.inner.pool.spawn(move || {
                    let checksum = engine.compute_checksum(&entry.path);
                    let _ = tx.send((entry, checksum));
                });
                in_flight += 1;
            }

            if is_cancelled(cancel) {
                return Ok(false);
            }
            if in_flight == 0 {
                return Ok(true);
            }

            let (entry, checksum) = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => continue,
                // We hold a sender, so this cannot happen.
                Err(RecvTimeoutError::Disconnected) => return Ok(!is_cancelled(cancel)),
            };
            in_flight -= 1;

            if is_cancelled(cancel) {
                log::trace!("Discarding result for {} after cancel", entry.path.display());
                return Ok(false);
            }

            match checksum {
                Checksum::Digest(hash) => {
                    store.upsert(&FileRecord::from_entry(&entry, &hash))?;
                    summary.hashed += 1;
                }
                Checksum::Failed(e) => {
                    log::warn!("Skipping unreadable file: {}", e);
                    summary.failed += 1;
                }
            }
            processed += 1;

            let duplicate_count = if processed % interval == 0 {
                Some(store.duplicate_group_count(Some(root))?)
            } else {
                None
            };
            let failed = summary.failed;
            self.publish_with(|s| {
                s.processed = processed;
                s.failed = failed;
                s.current_file = Some(entry.path.clone());
                if let Some(count) = duplicate_count {
                    s.duplicate_count = count;
                }
            });
        }
    }

    fn publish_with(&self, f: impl FnOnce(&mut ScanSnapshot)) {
        let snapshot = {
            let mut state = lock(&self.inner.state);
            f(&mut state.snapshot);
            state.snapshot.clone()
        };
        self.broadcast(&snapshot);
    }

    /// Apply a fallible edit to the snapshot and results, then publish.
    fn update(
        &self,
        f: impl FnOnce(&mut ScanSnapshot, &mut Option<Vec<DuplicateGroup>>) -> Result<(), TransitionError>,
    ) -> Result<ScanSnapshot, CoordinatorError> {
        let snapshot = {
            let mut guard = lock(&self.inner.state);
            let state = &mut *guard;
            f(&mut state.snapshot, &mut state.results)?;
            state.snapshot.clone()
        };
        self.broadcast(&snapshot);
        Ok(snapshot)
    }

    fn broadcast(&self, snapshot: &ScanSnapshot) {
        let observers: Vec<Arc<dyn ScanObserver>> = lock(&self.inner.observers).clone();
        for observer in &observers {
            observer.on_snapshot(snapshot);
        }
        lock(&self.inner.subscribers).retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

fn validate_root(root: &Path) -> Result<PathBuf, CoordinatorError> {
    let canonical = root.canonicalize().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            CoordinatorError::PathNotFound(root.to_path_buf())
        } else {
            CoordinatorError::InvalidRoot {
                path: root.to_path_buf(),
                source,
            }
        }
    })?;
    if !canonical.is_dir() {
        return Err(CoordinatorError::NotADirectory(root.to_path_buf()));
    }
    Ok(canonical)
}
