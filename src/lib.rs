//! dupevault - duplicate file finder with a persistent index and a quarantine
//!
//! Files under a root are walked, optionally pruned by size, hashed with
//! BLAKE3 and recorded in a SQLite index. Files sharing a checksum form
//! duplicate groups; every member but the oldest can be moved into a
//! quarantine directory and restored later.

pub mod actions;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod signal;
pub mod store;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::actions::{
    QuarantineError, QuarantineManager, QuarantineReport, ShellCapabilities, SystemShell,
};
use crate::cli::{
    ClearArgs, Cli, Commands, DedupeArgs, GroupsArgs, OutputFormat, QuarantineCommand, ScanArgs,
};
use crate::config::Config;
use crate::duplicates::DuplicateGroup;
use crate::error::ExitCode;
use crate::output::{json::JsonOutput, text, write_json};
use crate::progress::Progress;
use crate::session::{ScanCoordinator, ScanRequest, ScanStatus};
use crate::store::DuplicateStore;

/// Run the command described by `cli`.
///
/// The index is opened once for the whole run and closed before returning.
///
/// # Errors
///
/// Returns an error if the index cannot be opened or the command fails.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load_from(cli.config.as_deref());
    if let Some(db) = &cli.db {
        config.database_path = Some(db.clone());
    }

    let db_path = config.database_path();
    let store = store::global::initialize(&db_path)
        .with_context(|| format!("Failed to open index at {}", db_path.display()))?;
    log::debug!("Using index {}", db_path.display());

    let result = dispatch(&cli, config, store);

    if let Err(e) = store::global::shutdown() {
        log::warn!("Failed to close index: {}", e);
    }
    result
}

fn dispatch(cli: &Cli, config: Config, store: Arc<DuplicateStore>) -> Result<ExitCode> {
    match &cli.command {
        Commands::Scan(args) => run_scan(args, cli.quiet, config, store),
        Commands::Groups(args) => run_groups(args, &store),
        Commands::Dedupe(args) => run_dedupe(args, &config, store),
        Commands::Quarantine(command) => run_quarantine(command, &config, store),
        Commands::Clear(args) => run_clear(args, &store),
    }
}

fn run_scan(
    args: &ScanArgs,
    quiet: bool,
    mut config: Config,
    store: Arc<DuplicateStore>,
) -> Result<ExitCode> {
    if let Some(threshold) = args.threshold {
        config.quick_scan_threshold = threshold;
    }
    if let Some(threads) = args.hash_threads {
        config.hash_threads = usize::from(threads);
    }
    config.skip_hidden |= args.skip_hidden;
    config.include_empty |= args.include_empty;
    let quick_scan = config.quick_scan && !args.no_quick_scan;
    let extensions = if args.extensions.is_empty() {
        config.extensions.clone()
    } else {
        args.extensions.clone()
    };

    let shell = SystemShell::new().with_directory(args.path.clone());
    let root = shell
        .choose_directory()
        .context("No directory to scan")?;

    let coordinator = ScanCoordinator::new(store, config.coordinator_config())?;
    let show_progress = !quiet && args.output == OutputFormat::Text;
    coordinator.add_observer(Arc::new(Progress::new(!show_progress)));

    match signal::install_handler() {
        Ok(handler) => handler.attach(&coordinator),
        Err(e) => log::warn!("Ctrl+C will not cancel the scan: {}", e),
    }

    let request = ScanRequest::new(&root)
        .with_extensions(extensions)
        .with_quick_scan(quick_scan);
    let outcome = coordinator
        .run(request)
        .with_context(|| format!("Scan of {} failed", root.display()))?;
    let exit_code = ExitCode::from_outcome(&outcome);

    let mut stdout = io::stdout().lock();
    match args.output {
        OutputFormat::Text => {
            if outcome.status() == ScanStatus::Completed {
                text::write_groups(&mut stdout, &outcome.groups)?;
            }
            if !quiet {
                writeln!(stdout)?;
                text::write_scan_summary(&mut stdout, &outcome)?;
            }
        }
        OutputFormat::Json => {
            JsonOutput::new(
                outcome.status(),
                outcome.snapshot.root.as_deref(),
                &outcome.groups,
                &outcome.summary,
                exit_code,
            )
            .write_to(&mut stdout, true)?;
        }
    }

    Ok(exit_code)
}

fn run_groups(args: &GroupsArgs, store: &DuplicateStore) -> Result<ExitCode> {
    let root = resolve_root(args.root.as_deref())?;
    let groups = store
        .duplicate_groups(root.as_deref())
        .context("Failed to read duplicate groups")?;

    let mut stdout = io::stdout().lock();
    match args.output {
        OutputFormat::Text => text::write_groups(&mut stdout, &groups)?,
        OutputFormat::Json => {
            JsonOutput::from_groups(root.as_deref(), &groups).write_to(&mut stdout, true)?;
        }
    }

    Ok(if groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    })
}

fn run_dedupe(args: &DedupeArgs, config: &Config, store: Arc<DuplicateStore>) -> Result<ExitCode> {
    let root = resolve_root(args.root.as_deref())?;
    let groups = store
        .duplicate_groups(root.as_deref())
        .context("Failed to read duplicate groups")?;

    let mut stdout = io::stdout().lock();
    if groups.is_empty() {
        writeln!(stdout, "No duplicates found.")?;
        return Ok(ExitCode::NoDuplicates);
    }

    let manager = QuarantineManager::new(store, config.quarantine_dir(), config.restore_dir());
    let shell = SystemShell::new().with_assume_yes(args.yes);

    let files: usize = groups.iter().map(|g| g.duplicates().len()).sum();
    let bytes: u64 = groups.iter().map(DuplicateGroup::wasted_space).sum();
    let prompt = format!(
        "Move {} duplicate file(s) ({}) to {}?",
        files,
        ByteSize::b(bytes),
        manager.quarantine_dir().display()
    );
    if !shell.confirm(&prompt) {
        writeln!(stdout, "Nothing moved.")?;
        return Ok(ExitCode::Success);
    }

    let report = quarantine_groups(&manager, &groups)?;
    text::write_quarantine_report(&mut stdout, &report)?;

    Ok(if report.all_succeeded() {
        ExitCode::Success
    } else {
        ExitCode::PartialSuccess
    })
}

/// Quarantine every group, recording groups that could not be handled as
/// failures. Index errors abort.
fn quarantine_groups(
    manager: &QuarantineManager,
    groups: &[DuplicateGroup],
) -> Result<QuarantineReport> {
    let mut report = QuarantineReport::default();
    for group in groups {
        match manager.delete_group_duplicates(group) {
            Ok(partial) => report.merge(partial),
            Err(QuarantineError::Store(e)) => {
                return Err(e).context("Failed to update the index");
            }
            Err(e) => {
                log::warn!("Skipping group {}: {}", group.checksum, e);
                for file in group.duplicates() {
                    report.failures.push((file.path.clone(), e.to_string()));
                }
            }
        }
    }
    Ok(report)
}

fn run_quarantine(
    command: &QuarantineCommand,
    config: &Config,
    store: Arc<DuplicateStore>,
) -> Result<ExitCode> {
    let manager = QuarantineManager::new(store, config.quarantine_dir(), config.restore_dir());
    let mut stdout = io::stdout().lock();

    match command {
        QuarantineCommand::List { output } => {
            let groups = manager
                .list_quarantine()
                .context("Failed to list quarantine")?;
            match output {
                OutputFormat::Text => {
                    text::write_quarantine(&mut stdout, manager.quarantine_dir(), &groups)?;
                }
                OutputFormat::Json => write_json(&groups, &mut stdout, true)?,
            }
        }
        QuarantineCommand::Restore { file, yes } => {
            let shell = SystemShell::new().with_assume_yes(*yes);
            let entry = manager
                .entry(file)
                .with_context(|| format!("Cannot restore {}", file.display()))?;
            match manager.restore_file(&entry, &shell) {
                Ok(restored) => {
                    writeln!(
                        stdout,
                        "Restored {} → {}",
                        restored.from.display(),
                        restored.to.display()
                    )?;
                }
                Err(QuarantineError::RestoreDeclined(_)) => {
                    writeln!(stdout, "Nothing restored.")?;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Cannot restore {}", file.display()))
                }
            }
        }
        QuarantineCommand::Reveal => {
            let dir = manager.quarantine_dir();
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
            SystemShell::new().reveal(dir)?;
            writeln!(stdout, "{}", dir.display())?;
        }
    }

    Ok(ExitCode::Success)
}

fn run_clear(args: &ClearArgs, store: &DuplicateStore) -> Result<ExitCode> {
    let removed = match resolve_root(args.root.as_deref())? {
        Some(root) => store.clear_root(&root)?,
        None => store.clear_all()?,
    };
    writeln!(io::stdout(), "Removed {removed} record(s) from the index.")?;
    Ok(ExitCode::Success)
}

/// Stored paths are canonical, so root filters must be too.
fn resolve_root(root: Option<&Path>) -> Result<Option<PathBuf>> {
    root.map(|r| {
        r.canonicalize()
            .with_context(|| format!("Cannot access {}", r.display()))
    })
    .transpose()
}
