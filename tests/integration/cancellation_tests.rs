use dupevault::scanner::{Checksum, ChecksumEngine, Hasher};
use dupevault::session::{
    CoordinatorConfig, ScanCoordinator, ScanObserver, ScanRequest, ScanSnapshot, ScanStatus,
};
use dupevault::store::DuplicateStore;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Cancels the coordinator the first time `processed` reaches `at`.
struct CancelAt {
    at: usize,
    coordinator: ScanCoordinator,
    fired: AtomicBool,
}

impl ScanObserver for CancelAt {
    fn on_snapshot(&self, snapshot: &ScanSnapshot) {
        if snapshot.status == ScanStatus::Scanning
            && snapshot.processed == self.at
            && !self.fired.swap(true, Ordering::SeqCst)
        {
            self.coordinator.cancel();
        }
    }
}

/// BLAKE3 with a delay, so a session is still running when a test acts.
struct SlowEngine(Hasher);

impl ChecksumEngine for SlowEngine {
    fn compute_checksum(&self, path: &Path) -> Checksum {
        std::thread::sleep(Duration::from_millis(20));
        self.0.compute_checksum(path)
    }
}

/// `n` files forming pairs of duplicates.
fn populate(dir: &Path, n: usize) {
    for i in 0..n {
        fs::write(dir.join(format!("f{i:03}.txt")), format!("pair-{:03}", i / 2)).unwrap();
    }
}

fn coordinator() -> ScanCoordinator {
    let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
    ScanCoordinator::new(store, CoordinatorConfig::default()).unwrap()
}

fn slow_coordinator() -> ScanCoordinator {
    let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
    ScanCoordinator::with_engine(
        store,
        CoordinatorConfig::default(),
        Arc::new(SlowEngine(Hasher::new())),
    )
    .unwrap()
}

#[test]
fn test_cancel_after_k_files() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 20);

    let c8r = coordinator();
    let k = 5;
    c8r.add_observer(Arc::new(CancelAt {
        at: k,
        coordinator: c8r.clone(),
        fired: AtomicBool::new(false),
    }));

    let outcome = c8r.run(ScanRequest::new(dir.path())).unwrap();

    assert_eq!(outcome.status(), ScanStatus::Cancelled);
    assert!(outcome.snapshot.processed >= k);
    assert!(outcome.snapshot.processed <= k + 1);
    assert_eq!(outcome.snapshot.total, 20);
    assert!(outcome.groups.is_empty());
    assert!(c8r.results().is_none());
}

#[test]
fn test_fresh_start_after_cancel_has_no_residue() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 20);

    let c8r = coordinator();
    c8r.add_observer(Arc::new(CancelAt {
        at: 8,
        coordinator: c8r.clone(),
        fired: AtomicBool::new(false),
    }));
    let cancelled = c8r.run(ScanRequest::new(dir.path())).unwrap();
    assert_eq!(cancelled.status(), ScanStatus::Cancelled);

    let rx = c8r.subscribe();
    let outcome = c8r.run(ScanRequest::new(dir.path())).unwrap();

    let first = rx.try_iter().next().unwrap();
    assert_eq!(first.status, ScanStatus::Scanning);
    assert_eq!(first.processed, 0);
    assert_eq!(first.duplicate_count, 0);
    assert_eq!(first.session_id, cancelled.snapshot.session_id + 1);

    assert_eq!(outcome.status(), ScanStatus::Completed);
    assert_eq!(outcome.snapshot.processed, 20);
    assert_eq!(outcome.groups.len(), 10);
    assert_eq!(c8r.store().count().unwrap(), 20);
}

#[test]
fn test_cancel_running_background_session() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 50);

    let c8r = slow_coordinator();
    let rx = c8r.subscribe();
    let handle = c8r.start(ScanRequest::new(dir.path())).unwrap();

    // Wait until hashing is under way.
    for snapshot in rx.iter() {
        if snapshot.processed >= 1 {
            break;
        }
    }
    c8r.cancel();

    let outcome = handle.wait().unwrap();
    assert_eq!(outcome.status(), ScanStatus::Cancelled);
    assert!(outcome.snapshot.processed < 50);
    assert_eq!(c8r.snapshot().status, ScanStatus::Cancelled);
}

#[test]
fn test_new_start_supersedes_running_session() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 50);
    let other = TempDir::new().unwrap();
    populate(other.path(), 4);

    let c8r = slow_coordinator();
    let rx = c8r.subscribe();
    let first = c8r.start(ScanRequest::new(dir.path())).unwrap();

    for snapshot in rx.iter() {
        if snapshot.processed >= 1 {
            break;
        }
    }
    let second = c8r.start(ScanRequest::new(other.path())).unwrap();
    assert!(second.session_id() > first.session_id());

    let first = first.wait().unwrap();
    let second = second.wait().unwrap();

    assert_eq!(first.status(), ScanStatus::Cancelled);
    assert_eq!(second.status(), ScanStatus::Completed);
    assert_eq!(second.groups.len(), 2);
    assert_eq!(c8r.snapshot().session_id, second.snapshot.session_id);
}
