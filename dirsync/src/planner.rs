//! Sync planning: decides per relative path what to do to make the
//! destination tree match the source tree

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::filter::PathFilter;
use crate::inventory::{join_relative, Entry, EntryErrorPolicy, Inventory, InventoryOptions};

/// Immutable configuration for one planning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    /// Delete destination entries absent from the source
    #[serde(default)]
    pub delete_orphaned: bool,
    /// Produce the action list without touching the filesystem
    #[serde(default)]
    pub preview_only: bool,
    /// Leave a destination file alone when the source copy is newer
    #[serde(default)]
    pub skip_newer: bool,
    /// Leave every path present in both trees alone
    #[serde(default)]
    pub skip_existing: bool,
    /// Let entries whose name starts with `.` take part
    #[serde(default)]
    pub include_hidden: bool,
    /// Glob patterns excluded from both trees
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Per-entry error handling during inventory
    #[serde(default)]
    pub on_entry_error: EntryErrorPolicy,
}

impl SyncOptions {
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            delete_orphaned: false,
            preview_only: false,
            skip_newer: false,
            skip_existing: false,
            include_hidden: false,
            exclude_patterns: Vec::new(),
            on_entry_error: EntryErrorPolicy::default(),
        }
    }

    pub fn delete_orphaned(mut self, yes: bool) -> Self {
        self.delete_orphaned = yes;
        self
    }

    pub fn preview_only(mut self, yes: bool) -> Self {
        self.preview_only = yes;
        self
    }

    pub fn skip_newer(mut self, yes: bool) -> Self {
        self.skip_newer = yes;
        self
    }

    pub fn skip_existing(mut self, yes: bool) -> Self {
        self.skip_existing = yes;
        self
    }

    pub fn include_hidden(mut self, yes: bool) -> Self {
        self.include_hidden = yes;
        self
    }

    pub fn exclude(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_entry_error(mut self, policy: EntryErrorPolicy) -> Self {
        self.on_entry_error = policy;
        self
    }

    /// Inventory options shared by both trees
    pub fn inventory_options(&self) -> Result<InventoryOptions> {
        Ok(InventoryOptions {
            include_hidden: self.include_hidden,
            exclude: PathFilter::new(&self.exclude_patterns, true)?,
            on_entry_error: self.on_entry_error,
        })
    }
}

/// Kind of a planned action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateDir,
    Copy,
    Update,
    /// Remove the destination object, then create or copy the source type
    Replace,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateDir => "create_dir",
            Self::Copy => "copy",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAction {
    pub kind: ActionKind,
    pub relative_path: String,
    /// Absent for `delete`
    pub source_path: Option<PathBuf>,
    pub dest_path: PathBuf,
    /// Type of the driving entry
    pub is_directory: bool,
    pub size: u64,
    pub modified_at: SystemTime,
    /// Human readable justification
    pub reason: String,
}

impl SyncAction {
    /// Whether applying this action copies file bytes
    pub fn transfers_bytes(&self) -> bool {
        match self.kind {
            ActionKind::Copy | ActionKind::Update => true,
            ActionKind::Replace => !self.is_directory,
            ActionKind::CreateDir | ActionKind::Delete => false,
        }
    }
}

/// A path present in both trees that the plan leaves alone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub relative_path: String,
    pub dest_path: PathBuf,
    pub reason: String,
}

/// Summary counts of a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total_actions: usize,
    pub directory_creates: usize,
    pub copies: usize,
    pub updates: usize,
    pub replaces: usize,
    pub deletes: usize,
    pub skips: usize,
    pub bytes_to_transfer: u64,
}

/// The action list produced by one planning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPlan {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    /// Actions in execution order
    pub actions: Vec<SyncAction>,
    pub skipped: Vec<SkippedEntry>,
    pub summary: PlanSummary,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions of one kind
    pub fn actions_of(&self, kind: ActionKind) -> impl Iterator<Item = &SyncAction> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }

    /// Find the action for a relative path
    pub fn action_for(&self, relative_path: &str) -> Option<&SyncAction> {
        self.actions.iter().find(|a| a.relative_path == relative_path)
    }
}

const REASON_DIR_ABSENT: &str = "directory absent at destination";
const REASON_FILE_ABSENT: &str = "file absent at destination";
const REASON_SOURCE_NEWER: &str = "source is newer";
const REASON_SIZE_MISMATCH: &str = "same timestamp, different size";
const REASON_DIR_OVER_FILE: &str = "directory in source, file in destination";
const REASON_FILE_OVER_DIR: &str = "file in source, directory in destination";
const REASON_ORPHANED: &str = "orphaned at destination";

const SKIP_EXISTING: &str = "exists at destination";
const SKIP_NEWER: &str = "source is newer, skipping newer files";
const SKIP_UP_TO_DATE: &str = "up to date";
const SKIP_DEST_NEWER: &str = "destination is newer";
const SKIP_PARENT_KEPT: &str = "parent kept as file at destination";

/// Outcome of comparing one source entry with its destination counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Act(ActionKind, &'static str),
    Skip(&'static str),
    /// Both sides are directories
    Nothing,
}

/// Builds a [`SyncPlan`] from two inventories
pub struct Planner<'a> {
    options: &'a SyncOptions,
}

impl<'a> Planner<'a> {
    pub fn new(options: &'a SyncOptions) -> Self {
        Self { options }
    }

    /// Inventory both roots and plan. Never mutates the filesystem.
    #[tracing::instrument(skip_all, fields(
        source = %self.options.source_root.display(),
        dest = %self.options.dest_root.display(),
    ))]
    pub fn build(&self) -> Result<SyncPlan> {
        let inventory_options = self.options.inventory_options()?;
        let source = Inventory::scan(&self.options.source_root, &inventory_options)?;
        let dest = scan_destination(&self.options.dest_root, &inventory_options)?;

        let plan = self.plan_inventories(&source, &dest);
        info!(
            actions = plan.summary.total_actions,
            copies = plan.summary.copies,
            updates = plan.summary.updates,
            deletes = plan.summary.deletes,
            skips = plan.summary.skips,
            "plan built"
        );
        Ok(plan)
    }

    /// Plan from inventories already in hand
    pub fn plan_inventories(&self, source: &Inventory, dest: &Inventory) -> SyncPlan {
        let mut actions = Vec::new();
        let mut skipped = Vec::new();

        // Destination directories whose source counterpart is a file. Their
        // subtrees are either removed by the replace or deliberately kept.
        let mut shadowed_dest_dirs: HashSet<&str> = HashSet::new();
        // Source directories kept as files at the destination; nothing can go beneath them.
        let mut blocked_source_dirs: HashSet<&str> = HashSet::new();

        for src in source.iter() {
            let path = src.relative_path.as_str();

            if has_ancestor_in(path, &blocked_source_dirs) {
                if src.is_directory {
                    blocked_source_dirs.insert(path);
                }
                skipped.push(self.skipped(path, SKIP_PARENT_KEPT));
                continue;
            }

            let dst = dest.get(path);
            let decision = self.decide(src, dst);
            debug!(path, ?decision, "decided");

            if let Some(dst) = dst {
                if dst.is_directory && !src.is_directory {
                    shadowed_dest_dirs.insert(path);
                }
                if src.is_directory && !dst.is_directory && !matches!(decision, Decision::Act(..)) {
                    blocked_source_dirs.insert(path);
                }
            }

            match decision {
                Decision::Act(kind, reason) => actions.push(self.action(kind, src, reason)),
                Decision::Skip(reason) => skipped.push(self.skipped(path, reason)),
                Decision::Nothing => {}
            }
        }

        if self.options.delete_orphaned {
            let mut orphans: Vec<&Entry> = dest
                .iter()
                .filter(|entry| !source.contains(&entry.relative_path))
                .filter(|entry| !has_ancestor_in(&entry.relative_path, &shadowed_dest_dirs))
                .collect();

            // Descending order puts children ahead of their parent directory.
            orphans.sort_by(|a, b| b.relative_path.cmp(&a.relative_path));

            actions.extend(orphans.into_iter().map(|entry| self.delete_action(entry)));
        }

        let summary = summarize(&actions, skipped.len());

        SyncPlan {
            source_root: self.options.source_root.clone(),
            dest_root: self.options.dest_root.clone(),
            actions,
            skipped,
            summary,
        }
    }

    fn decide(&self, src: &Entry, dst: Option<&Entry>) -> Decision {
        let Some(dst) = dst else {
            return if src.is_directory {
                Decision::Act(ActionKind::CreateDir, REASON_DIR_ABSENT)
            } else {
                Decision::Act(ActionKind::Copy, REASON_FILE_ABSENT)
            };
        };

        match (src.is_directory, dst.is_directory) {
            (true, true) => Decision::Nothing,
            (true, false) | (false, true) if self.options.skip_existing => {
                Decision::Skip(SKIP_EXISTING)
            }
            (true, false) => Decision::Act(ActionKind::Replace, REASON_DIR_OVER_FILE),
            (false, true) => Decision::Act(ActionKind::Replace, REASON_FILE_OVER_DIR),
            (false, false) => self.decide_files(src, dst),
        }
    }

    fn decide_files(&self, src: &Entry, dst: &Entry) -> Decision {
        let src_secs = src.modified_secs();
        let dst_secs = dst.modified_secs();

        if src_secs > dst_secs {
            if self.options.skip_newer {
                Decision::Skip(SKIP_NEWER)
            } else if self.options.skip_existing {
                Decision::Skip(SKIP_EXISTING)
            } else {
                Decision::Act(ActionKind::Update, REASON_SOURCE_NEWER)
            }
        } else if src_secs == dst_secs && src.size != dst.size {
            if self.options.skip_existing {
                Decision::Skip(SKIP_EXISTING)
            } else {
                Decision::Act(ActionKind::Update, REASON_SIZE_MISMATCH)
            }
        } else if src_secs < dst_secs {
            Decision::Skip(SKIP_DEST_NEWER)
        } else {
            Decision::Skip(SKIP_UP_TO_DATE)
        }
    }

    fn action(&self, kind: ActionKind, src: &Entry, reason: &str) -> SyncAction {
        SyncAction {
            kind,
            relative_path: src.relative_path.clone(),
            source_path: Some(self.source_path(&src.relative_path)),
            dest_path: self.dest_path(&src.relative_path),
            is_directory: src.is_directory,
            size: src.size,
            modified_at: src.modified_at,
            reason: reason.to_string(),
        }
    }

    fn delete_action(&self, entry: &Entry) -> SyncAction {
        SyncAction {
            kind: ActionKind::Delete,
            relative_path: entry.relative_path.clone(),
            source_path: None,
            dest_path: self.dest_path(&entry.relative_path),
            is_directory: entry.is_directory,
            size: entry.size,
            modified_at: entry.modified_at,
            reason: REASON_ORPHANED.to_string(),
        }
    }

    fn skipped(&self, relative_path: &str, reason: &str) -> SkippedEntry {
        SkippedEntry {
            relative_path: relative_path.to_string(),
            dest_path: self.dest_path(relative_path),
            reason: reason.to_string(),
        }
    }

    fn source_path(&self, relative_path: &str) -> PathBuf {
        join_relative(&self.options.source_root, relative_path)
    }

    fn dest_path(&self, relative_path: &str) -> PathBuf {
        join_relative(&self.options.dest_root, relative_path)
    }
}

/// A destination root that does not exist yet inventories as empty
fn scan_destination(dest_root: &Path, options: &InventoryOptions) -> Result<Inventory> {
    match Inventory::scan(dest_root, options) {
        Err(SyncError::NotFound { .. }) => {
            debug!(dest = %dest_root.display(), "destination missing, planning against empty tree");
            Ok(Inventory::empty(dest_root))
        }
        other => other,
    }
}

fn has_ancestor_in(path: &str, dirs: &HashSet<&str>) -> bool {
    !dirs.is_empty()
        && path
            .match_indices('/')
            .any(|(idx, _)| dirs.contains(&path[..idx]))
}

fn summarize(actions: &[SyncAction], skips: usize) -> PlanSummary {
    let mut summary = PlanSummary {
        total_actions: actions.len(),
        skips,
        ..Default::default()
    };

    for action in actions {
        match action.kind {
            ActionKind::CreateDir => summary.directory_creates += 1,
            ActionKind::Copy => summary.copies += 1,
            ActionKind::Update => summary.updates += 1,
            ActionKind::Replace => summary.replaces += 1,
            ActionKind::Delete => summary.deletes += 1,
        }
        if action.transfers_bytes() {
            summary.bytes_to_transfer += action.size;
        }
    }

    summary
}
