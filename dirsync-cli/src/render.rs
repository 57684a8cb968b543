//! Terminal output for plans, reports, comparisons and diffs

use anyhow::Result;
use dirsync::report::{describe, preview_lines};
use dirsync::{Comparison, Entry, ExecutionReport, FileDiff, SyncError, SyncPlan};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_preview(plan: &SyncPlan) {
    println!("DRY RUN: no changes made");
    for line in preview_lines(plan) {
        println!("{line}");
    }
    let s = &plan.summary;
    println!(
        "Plan: {} actions ({} copies, {} updates, {} replaces, {} directories, {} deletes), {} skipped, {} bytes",
        s.total_actions, s.copies, s.updates, s.replaces, s.directory_creates, s.deletes, s.skips, s.bytes_to_transfer
    );
}

pub fn print_report(report: &ExecutionReport) {
    for line in report.lines() {
        println!("{line}");
    }
    let elapsed = report
        .finished_at
        .map(|end| (end - report.started_at).num_milliseconds())
        .unwrap_or_default();
    println!("Done in {elapsed} ms: {}", report.summary());
}

/// Partial-completion output after a failed action
pub fn print_partial(err: &SyncError) {
    let SyncError::ActionFailed { action, completed, .. } = err else {
        return;
    };

    eprintln!("Sync stopped; {} action(s) completed before the failure:", completed.records.len());
    for line in completed.lines() {
        eprintln!("  {line}");
    }
    eprintln!("Failed while applying: {}", describe(action));

    let pending = err.pending_actions();
    if !pending.is_empty() {
        eprintln!("Not attempted ({}):", pending.len());
        for action in pending {
            eprintln!("  {}", describe(action));
        }
    }
}

pub fn print_comparison(comparison: &Comparison) {
    print_section("Only in A", &comparison.only_in_a);
    print_section("Only in B", &comparison.only_in_b);
    print_section("In both", &comparison.common);
}

fn print_section(title: &str, entries: &[Entry]) {
    println!("{title} ({}):", entries.len());
    for entry in entries {
        let marker = if entry.is_directory { "/" } else { "" };
        println!("  {}{}", entry.relative_path, marker);
    }
}

pub fn print_diff(diff: &FileDiff) {
    for line in &diff.lines {
        println!("{line}");
    }
    eprintln!(
        "{} added, {} removed, {} unchanged",
        diff.stats.added, diff.stats.removed, diff.stats.unchanged
    );
}
