//! Human-readable terminal output.
//!
//! Sizes are printed with `bytesize`; every writer takes any `io::Write`
//! so reports can be captured in tests.

use std::io::{self, Write};
use std::path::Path;

use bytesize::ByteSize;

use crate::actions::{QuarantineGroup, QuarantineReport};
use crate::duplicates::DuplicateGroup;
use crate::session::{ScanOutcome, ScanStatus};

/// Print duplicate groups, representative first and marked `keep`.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_groups<W: Write>(writer: &mut W, groups: &[DuplicateGroup]) -> io::Result<()> {
    if groups.is_empty() {
        writeln!(writer, "No duplicates found.")?;
        return Ok(());
    }

    for (idx, group) in groups.iter().enumerate() {
        let size = group.representative().map_or(0, |r| r.size);
        writeln!(
            writer,
            "Group {}: {} files × {} ({} reclaimable) [{}]",
            idx + 1,
            group.count(),
            ByteSize::b(size),
            ByteSize::b(group.wasted_space()),
            short_checksum(&group.checksum)
        )?;
        let keep = group.representative_index();
        for (i, file) in group.files.iter().enumerate() {
            let marker = if Some(i) == keep { "keep" } else { "    " };
            writeln!(writer, "  {marker} {}", file.path.display())?;
        }
        writeln!(writer)?;
    }

    let wasted: u64 = groups.iter().map(DuplicateGroup::wasted_space).sum();
    writeln!(
        writer,
        "{} group(s), {} reclaimable",
        groups.len(),
        ByteSize::b(wasted)
    )
}

/// Print the one-paragraph summary of a scan.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_scan_summary<W: Write>(writer: &mut W, outcome: &ScanOutcome) -> io::Result<()> {
    let s = &outcome.summary;
    let root = outcome
        .snapshot
        .root
        .as_deref()
        .map(Path::display)
        .map(|d| d.to_string())
        .unwrap_or_default();

    match outcome.status() {
        ScanStatus::Completed => {
            writeln!(writer, "Scanned {root} in {:.2?}", s.elapsed)?;
            writeln!(
                writer,
                "  {} file(s) found, {} hashed, {} skipped by size, {} unreadable",
                s.candidates, s.hashed, s.skipped_by_size, s.failed
            )?;
            writeln!(
                writer,
                "  {} duplicate group(s), {} reclaimable",
                s.duplicate_groups,
                ByteSize::b(s.wasted_space)
            )
        }
        ScanStatus::Cancelled => writeln!(
            writer,
            "Scan of {root} cancelled after {} of {} file(s); no results kept.",
            outcome.snapshot.processed, outcome.snapshot.total
        ),
        other => writeln!(writer, "Scan of {root} ended: {other}"),
    }
}

/// Print the contents of the quarantine directory.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_quarantine<W: Write>(
    writer: &mut W,
    dir: &Path,
    groups: &[QuarantineGroup],
) -> io::Result<()> {
    if groups.is_empty() {
        writeln!(writer, "Quarantine is empty ({}).", dir.display())?;
        return Ok(());
    }

    writeln!(writer, "Quarantine: {}", dir.display())?;
    for group in groups {
        writeln!(
            writer,
            "  [{}] {} file(s), {}",
            short_checksum(&group.checksum),
            group.count(),
            ByteSize::b(group.total_size())
        )?;
        for entry in &group.entries {
            let shown = entry
                .quarantine_path
                .strip_prefix(dir)
                .unwrap_or(&entry.quarantine_path);
            writeln!(writer, "    {}", shown.display())?;
        }
    }
    Ok(())
}

/// Print the result of a dedupe run.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_quarantine_report<W: Write>(
    writer: &mut W,
    report: &QuarantineReport,
) -> io::Result<()> {
    for moved in &report.moved {
        writeln!(
            writer,
            "moved  {} → {}",
            moved.original_path.display(),
            moved.quarantine_path.display()
        )?;
    }
    for (path, reason) in &report.failures {
        writeln!(writer, "kept   {} ({reason})", path.display())?;
    }
    writeln!(writer, "{}", report.summary())
}

fn short_checksum(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}
