//! Directory Sync Engine Library
//!
//! A synchronous engine for keeping one directory tree in line with another:
//! - Tree inventory with hidden-entry and pattern exclusion
//! - Set comparison of two directories
//! - Sync planning under skip/delete policies, with a preview mode
//! - Action execution with a caller-supplied confirmation predicate
//! - LCS based line diffing of two files

pub mod comparator;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filter;
pub mod inventory;
pub mod line_diff;
pub mod planner;
pub mod report;

pub use comparator::{compare, Comparison};
pub use engine::{SyncEngine, SyncRun};
pub use error::{Result, SyncError};
pub use executor::Executor;
pub use filter::PathFilter;
pub use inventory::{inventory, Entry, EntryErrorPolicy, Inventory, InventoryOptions};
pub use line_diff::{diff_files, diff_lines, try_diff_lines, DiffKind, DiffLine, DiffOptions, DiffStats, FileDiff};
pub use planner::{ActionKind, Planner, PlanSummary, SkippedEntry, SyncAction, SyncOptions, SyncPlan};
pub use report::{ExecutionReport, Outcome, ReportStats};

/// Plan a sync and, unless `options.preview_only`, apply it.
///
/// On failure the returned [`SyncError::ActionFailed`] names the action in
/// progress and carries the full plan plus the outcome of every earlier
/// action. Applied actions are not rolled back.
pub fn plan(options: &SyncOptions) -> Result<SyncPlan> {
    SyncEngine::new(options.clone()).run().map(|run| run.plan)
}

#[cfg(test)]
mod test_utils;
