//! Desktop-shell integration points.
//!
//! The engine never talks to a file manager, dialog or terminal directly.
//! Everything it needs from the outside world goes through
//! [`ShellCapabilities`], which front ends implement.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Error raised when a shell action cannot be carried out.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// The target does not exist.
    #[error("No such file or directory: {0}")]
    NotFound(PathBuf),

    /// The platform opener failed.
    #[error("Failed to open {path}: {source}")]
    Launch {
        /// Target that could not be opened
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// External collaborators the engine depends on.
pub trait ShellCapabilities: Send + Sync {
    /// Ask for a directory to scan. `None` means the user declined.
    fn choose_directory(&self) -> Option<PathBuf>;

    /// Show a directory in the platform file manager.
    ///
    /// # Errors
    ///
    /// Returns a [`ShellError`] if the directory is missing or cannot be shown.
    fn reveal(&self, dir: &Path) -> Result<(), ShellError>;

    /// Open a file with its default application.
    ///
    /// # Errors
    ///
    /// Returns a [`ShellError`] if the file is missing or cannot be opened.
    fn open(&self, file: &Path) -> Result<(), ShellError>;

    /// Ask a yes/no question. Anything but an explicit yes is a no.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Shell backed by the running terminal and the platform opener.
#[derive(Debug, Clone, Default)]
pub struct SystemShell {
    directory: Option<PathBuf>,
    assume_yes: bool,
}

impl SystemShell {
    /// Create a shell that prompts on stdin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory returned by [`ShellCapabilities::choose_directory`].
    /// Without one, the current directory is used.
    #[must_use]
    pub fn with_directory(mut self, directory: Option<PathBuf>) -> Self {
        self.directory = directory;
        self
    }

    /// Answer every confirmation with yes.
    #[must_use]
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    fn launch(target: &Path) -> Result<(), ShellError> {
        if !target.exists() {
            return Err(ShellError::NotFound(target.to_path_buf()));
        }
        open::that(target).map_err(|source| ShellError::Launch {
            path: target.to_path_buf(),
            source,
        })
    }
}

impl ShellCapabilities for SystemShell {
    fn choose_directory(&self) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| std::env::current_dir().ok())
    }

    fn reveal(&self, dir: &Path) -> Result<(), ShellError> {
        Self::launch(dir)
    }

    fn open(&self, file: &Path) -> Result<(), ShellError> {
        Self::launch(file)
    }

    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        let mut stderr = io::stderr();
        let _ = write!(stderr, "{prompt} [y/N] ");
        let _ = stderr.flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// A call made against a [`RecordingShell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCall {
    /// `choose_directory`
    ChooseDirectory,
    /// `reveal(dir)`
    Reveal(PathBuf),
    /// `open(file)`
    Open(PathBuf),
    /// `confirm(prompt)`
    Confirm(String),
}

/// Headless shell with scripted answers that records every call.
#[derive(Debug, Default)]
pub struct RecordingShell {
    directory: Option<PathBuf>,
    answer: bool,
    calls: Mutex<Vec<ShellCall>>,
}

impl RecordingShell {
    /// Create a shell that answers `answer` to every confirmation.
    #[must_use]
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }

    /// Directory returned by `choose_directory`.
    #[must_use]
    pub fn with_directory(mut self, directory: PathBuf) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ShellCall> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: ShellCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl ShellCapabilities for RecordingShell {
    fn choose_directory(&self) -> Option<PathBuf> {
        self.record(ShellCall::ChooseDirectory);
        self.directory.clone()
    }

    fn reveal(&self, dir: &Path) -> Result<(), ShellError> {
        self.record(ShellCall::Reveal(dir.to_path_buf()));
        if dir.exists() {
            Ok(())
        } else {
            Err(ShellError::NotFound(dir.to_path_buf()))
        }
    }

    fn open(&self, file: &Path) -> Result<(), ShellError> {
        self.record(ShellCall::Open(file.to_path_buf()));
        if file.exists() {
            Ok(())
        } else {
            Err(ShellError::NotFound(file.to_path_buf()))
        }
    }

    fn confirm(&self, prompt: &str) -> bool {
        self.record(ShellCall::Confirm(prompt.to_string()));
        self.answer
    }
}
