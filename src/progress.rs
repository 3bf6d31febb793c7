//! Terminal progress reporting using indicatif.
//!
//! [`Progress`] is a [`ScanObserver`]: the coordinator hands it every
//! snapshot and it renders a spinner while the tree is walked, then a bar
//! while files are hashed.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::session::{ScanObserver, ScanSnapshot, ScanStatus};

/// Progress reporter driven by scan snapshots.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a reporter. With `quiet`, nothing is drawn.
    ///
    /// ```
    /// use dupevault::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn walking_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn hashing_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn render(&self, bar: &mut Option<ProgressBar>, snapshot: &ScanSnapshot) {
        match snapshot.status {
            ScanStatus::Scanning if snapshot.total == 0 && snapshot.processed == 0 => {
                if bar.is_none() {
                    let pb = ProgressBar::new_spinner();
                    pb.set_style(Self::walking_style());
                    pb.set_message("Walking directory");
                    pb.enable_steady_tick(Duration::from_millis(100));
                    *bar = Some(pb);
                }
            }
            ScanStatus::Scanning => {
                let pb = bar.get_or_insert_with(|| ProgressBar::new(snapshot.total as u64));
                if pb.length() != Some(snapshot.total as u64) {
                    pb.disable_steady_tick();
                    pb.set_style(Self::hashing_style());
                    pb.set_length(snapshot.total as u64);
                }
                pb.set_position(snapshot.processed as u64);
                let current = snapshot
                    .current_file
                    .as_deref()
                    .map(|p| truncate_path(&p.to_string_lossy(), 30))
                    .unwrap_or_default();
                pb.set_message(format!("{} dup group(s) {}", snapshot.duplicate_count, current));
            }
            ScanStatus::Completed => {
                if let Some(pb) = bar.take() {
                    pb.finish_with_message(format!(
                        "Done: {} duplicate group(s)",
                        snapshot.duplicate_count
                    ));
                }
            }
            ScanStatus::Cancelled | ScanStatus::Error => {
                if let Some(pb) = bar.take() {
                    pb.abandon_with_message(snapshot.status.to_string());
                }
            }
            ScanStatus::Idle => {}
        }
    }
}

impl ScanObserver for Progress {
    fn on_snapshot(&self, snapshot: &ScanSnapshot) {
        if self.quiet {
            return;
        }
        if let Ok(mut bar) = self.bar.lock() {
            self.render(&mut bar, snapshot);
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let count = file_name.chars().count();
    if count >= max_len {
        let tail: String = file_name.chars().skip(count + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
