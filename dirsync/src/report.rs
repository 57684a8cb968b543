//! Execution reports and textual rendering of plans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::planner::{ActionKind, SkippedEntry, SyncAction, SyncPlan};

/// What happened to one planned action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    /// The caller's confirmation predicate refused it
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: SyncAction,
    pub outcome: Outcome,
}

/// Counters for an execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    /// Files written (copy, update, and file replaces)
    pub copied: usize,
    pub updated: usize,
    pub created_dirs: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub declined: usize,
    pub bytes_copied: u64,
}

/// Status of every action a plan execution reached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records: Vec<ActionRecord>,
    pub skipped: Vec<SkippedEntry>,
    pub stats: ReportStats,
}

impl ExecutionReport {
    pub(crate) fn start(plan: &SyncPlan) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            records: Vec::with_capacity(plan.actions.len()),
            skipped: plan.skipped.clone(),
            stats: ReportStats {
                skipped: plan.skipped.len(),
                ..Default::default()
            },
        }
    }

    pub(crate) fn record(&mut self, action: &SyncAction, outcome: Outcome) {
        if outcome == Outcome::Applied {
            match action.kind {
                ActionKind::CreateDir => self.stats.created_dirs += 1,
                ActionKind::Copy => self.stats.copied += 1,
                ActionKind::Update => {
                    self.stats.copied += 1;
                    self.stats.updated += 1;
                }
                ActionKind::Replace => {
                    self.stats.replaced += 1;
                    if !action.is_directory {
                        self.stats.copied += 1;
                    }
                }
                ActionKind::Delete => self.stats.deleted += 1,
            }
            if action.transfers_bytes() {
                self.stats.bytes_copied += action.size;
            }
        } else {
            self.stats.declined += 1;
        }

        self.records.push(ActionRecord {
            action: action.clone(),
            outcome,
        });
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// Applied actions, in order
    pub fn applied(&self) -> impl Iterator<Item = &SyncAction> {
        self.records
            .iter()
            .filter(|r| r.outcome == Outcome::Applied)
            .map(|r| &r.action)
    }

    /// One line per record followed by one line per skipped entry
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .records
            .iter()
            .map(|record| match record.outcome {
                Outcome::Applied => describe(&record.action),
                Outcome::Declined => format!("x Declined: {}", record.action.dest_path.display()),
            })
            .collect();
        lines.extend(self.skipped.iter().map(describe_skipped));
        lines
    }

    /// One-line count summary
    pub fn summary(&self) -> String {
        format!(
            "{} copied, {} directories created, {} deleted, {} skipped, {} declined ({} bytes)",
            self.stats.copied,
            self.stats.created_dirs,
            self.stats.deleted,
            self.stats.skipped,
            self.stats.declined,
            self.stats.bytes_copied
        )
    }
}

/// Render an action the way it reads once applied
pub fn describe(action: &SyncAction) -> String {
    let dest = action.dest_path.display();
    let source = action
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    match action.kind {
        ActionKind::CreateDir => format!("+ Created: {}", dest),
        ActionKind::Copy => format!("+ Copied: {} -> {}", source, dest),
        ActionKind::Update => format!("+ Updated: {} -> {}", source, dest),
        ActionKind::Replace => format!("* Replaced: {} -> {}", source, dest),
        ActionKind::Delete => format!("- Deleted: {}", dest),
    }
}

pub fn describe_skipped(entry: &SkippedEntry) -> String {
    format!("~ Skipped: {} ({})", entry.dest_path.display(), entry.reason)
}

/// Lines for a plan that was not executed
pub fn preview_lines(plan: &SyncPlan) -> Vec<String> {
    plan.actions
        .iter()
        .map(|action| format!("{}  [{}]", describe(action), action.reason))
        .chain(plan.skipped.iter().map(describe_skipped))
        .collect()
}
