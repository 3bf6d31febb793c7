use dupevault::session::{
    CoordinatorConfig, CoordinatorError, ScanCoordinator, ScanObserver, ScanRequest, ScanSnapshot,
    ScanStatus,
};
use dupevault::store::{DuplicateStore, StoreError};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Closes the store once the first file has been recorded.
struct CloseStoreAfterFirst {
    store: Arc<DuplicateStore>,
    fired: AtomicBool,
}

impl ScanObserver for CloseStoreAfterFirst {
    fn on_snapshot(&self, snapshot: &ScanSnapshot) {
        if snapshot.status == ScanStatus::Scanning
            && snapshot.processed == 1
            && !self.fired.swap(true, Ordering::SeqCst)
        {
            self.store.close().unwrap();
        }
    }
}

/// Keeps every snapshot it sees.
#[derive(Default)]
struct Recorder(Mutex<Vec<ScanSnapshot>>);

impl ScanObserver for Recorder {
    fn on_snapshot(&self, snapshot: &ScanSnapshot) {
        self.0.lock().unwrap().push(snapshot.clone());
    }
}

#[test]
fn test_store_failure_ends_session_in_error() {
    let dir = TempDir::new().unwrap();
    for i in 0..6 {
        fs::write(dir.path().join(format!("f{i}.txt")), format!("pair-{}", i / 2)).unwrap();
    }

    let store = Arc::new(DuplicateStore::open_in_memory().unwrap());
    let coordinator = ScanCoordinator::new(Arc::clone(&store), CoordinatorConfig::default()).unwrap();
    coordinator.add_observer(Arc::new(CloseStoreAfterFirst {
        store: Arc::clone(&store),
        fired: AtomicBool::new(false),
    }));
    let recorder = Arc::new(Recorder::default());
    coordinator.add_observer(recorder.clone());

    let err = coordinator.run(ScanRequest::new(dir.path())).unwrap_err();
    assert!(matches!(err, CoordinatorError::Store(StoreError::Closed)));

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.status, ScanStatus::Error);
    let message = snapshot.error_message.expect("error message recorded");
    assert!(!message.is_empty());
    assert!(coordinator.results().is_none());

    let seen = recorder.0.lock().unwrap();
    assert_eq!(seen.last().map(|s| s.status), Some(ScanStatus::Error));
    assert!(seen.iter().all(|s| s.status != ScanStatus::Completed));
}
