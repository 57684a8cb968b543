//! Applies planned actions to the real filesystem

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::inventory::get_permissions;
use crate::planner::{ActionKind, SyncAction, SyncPlan};
use crate::report::{ExecutionReport, Outcome};

/// Filesystem executor for [`SyncAction`]s
///
/// Every operation leaves the filesystem in the same state when repeated, so
/// re-running a plan that partially failed is safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Apply every action of `plan` in order, asking `confirm` first.
    ///
    /// The destination root is created before anything else. The first
    /// failure stops execution and is returned as [`SyncError::ActionFailed`]
    /// carrying the report of what was applied so far.
    #[tracing::instrument(skip_all, fields(dest = %plan.dest_root.display(), actions = plan.actions.len()))]
    pub fn apply_plan<F>(&self, plan: &SyncPlan, mut confirm: F) -> Result<ExecutionReport>
    where
        F: FnMut(&SyncAction) -> bool,
    {
        let mut report = ExecutionReport::start(plan);

        if let Err(source) = create_dir_all(&plan.dest_root) {
            return Err(SyncError::ActionFailed {
                index: 0,
                action: Box::new(root_action(plan)),
                plan: Box::new(plan.clone()),
                completed: Box::new(report.finish()),
                source: Box::new(source),
            });
        }

        for (index, action) in plan.actions.iter().enumerate() {
            if !confirm(action) {
                debug!(path = %action.relative_path, kind = %action.kind, "declined");
                report.record(action, Outcome::Declined);
                continue;
            }

            if let Err(source) = self.apply(action) {
                warn!("Failed to apply {} for '{}': {}", action.kind, action.dest_path.display(), source);
                return Err(SyncError::ActionFailed {
                    index,
                    action: Box::new(action.clone()),
                    plan: Box::new(plan.clone()),
                    completed: Box::new(report.finish()),
                    source: Box::new(source),
                });
            }

            report.record(action, Outcome::Applied);
        }

        let report = report.finish();
        info!(
            copied = report.stats.copied,
            deleted = report.stats.deleted,
            skipped = report.stats.skipped,
            declined = report.stats.declined,
            "plan applied"
        );
        Ok(report)
    }

    /// Apply one action
    pub fn apply(&self, action: &SyncAction) -> Result<()> {
        debug!(kind = %action.kind, path = %action.dest_path.display(), "applying");

        match action.kind {
            ActionKind::CreateDir => create_dir_all(&action.dest_path),
            ActionKind::Copy | ActionKind::Update => copy_file(source_of(action)?, &action.dest_path),
            ActionKind::Replace => {
                remove_any(&action.dest_path)?;
                if action.is_directory {
                    create_dir_all(&action.dest_path)
                } else {
                    copy_file(source_of(action)?, &action.dest_path)
                }
            }
            ActionKind::Delete => {
                if action.is_directory {
                    remove_dir_all(&action.dest_path)
                } else {
                    remove_file(&action.dest_path)
                }
            }
        }
    }
}

fn source_of(action: &SyncAction) -> Result<&Path> {
    action.source_path.as_deref().ok_or_else(|| {
        SyncError::io(
            &action.dest_path,
            io::Error::new(io::ErrorKind::InvalidInput, format!("{} action without a source path", action.kind)),
        )
    })
}

fn root_action(plan: &SyncPlan) -> SyncAction {
    SyncAction {
        kind: ActionKind::CreateDir,
        relative_path: String::new(),
        source_path: Some(plan.source_root.clone()),
        dest_path: plan.dest_root.clone(),
        is_directory: true,
        size: 0,
        modified_at: std::time::SystemTime::UNIX_EPOCH,
        reason: "destination root".to_string(),
    }
}

fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| SyncError::io(path, e))
}

/// Copy bytes, then the source permission bits. A symbolic link is
/// recreated with the same target instead of being followed.
fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        create_dir_all(parent)?;
    }

    // Never write through a link already sitting at the destination
    remove_link(destination)?;

    let metadata = fs::symlink_metadata(source).map_err(|e| SyncError::from_io(source, e))?;
    if metadata.file_type().is_symlink() {
        return copy_link(source, destination);
    }

    fs::copy(source, destination).map_err(|e| SyncError::from_io(source, e))?;
    set_permissions(destination, get_permissions(&metadata))
}

fn remove_link(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => remove_file(path),
        _ => Ok(()),
    }
}

fn copy_link(source: &Path, destination: &Path) -> Result<()> {
    let target = fs::read_link(source).map_err(|e| SyncError::from_io(source, e))?;
    remove_file(destination)?;
    debug!(link = %destination.display(), target = %target.display(), "recreating link");
    make_link(&target, source, destination).map_err(|e| SyncError::io(destination, e))
}

#[cfg(unix)]
fn make_link(target: &Path, _source: &Path, destination: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, destination)
}

#[cfg(windows)]
fn make_link(target: &Path, source: &Path, destination: &Path) -> io::Result<()> {
    // Windows needs to know the kind of link; a dangling target counts as a file
    if fs::metadata(source).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(target, destination)
    } else {
        std::os::windows::fs::symlink_file(target, destination)
    }
}

#[cfg(not(any(unix, windows)))]
fn make_link(_target: &Path, source: &Path, destination: &Path) -> io::Result<()> {
    fs::copy(source, destination).map(|_| ())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| SyncError::io(path, e))
}

#[cfg(not(unix))]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path).map_err(|e| SyncError::io(path, e))?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms).map_err(|e| SyncError::io(path, e))
}

fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(SyncError::io(path, e)),
        _ => Ok(()),
    }
}

fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(SyncError::io(path, e)),
        _ => Ok(()),
    }
}

/// Remove whatever sits at `path`
fn remove_any(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => remove_dir_all(path),
        Ok(_) => remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{Planner, SyncOptions};
    use crate::test_utils::{mkdir, read, write_file};
    use rstest::*;
    use tempfile::TempDir;

    struct Trees {
        _temp_dir: TempDir,
        source: std::path::PathBuf,
        dest: std::path::PathBuf,
    }

    #[fixture]
    fn trees() -> Trees {
        let temp_dir = TempDir::new().unwrap();
        let source = mkdir(temp_dir.path(), "source");
        let dest = temp_dir.path().join("dest");
        Trees {
            _temp_dir: temp_dir,
            source,
            dest,
        }
    }

    fn plan_for(trees: &Trees, delete_orphaned: bool) -> SyncPlan {
        let options = SyncOptions::new(&trees.source, &trees.dest).delete_orphaned(delete_orphaned);
        Planner::new(&options).build().unwrap()
    }

    #[rstest]
    fn test_copy_creates_parents(trees: Trees) {
        write_file(&trees.source, "a/b/c.txt", "deep");
        let plan = plan_for(&trees, false);

        let report = Executor::new().apply_plan(&plan, |_| true).unwrap();

        assert_eq!(read(&trees.dest, "a/b/c.txt"), "deep");
        assert_eq!(report.stats.copied, 1);
        assert_eq!(report.stats.created_dirs, 2);
    }

    #[cfg(unix)]
    #[rstest]
    fn test_copy_applies_permissions(trees: Trees) {
        use std::os::unix::fs::PermissionsExt;

        let script = write_file(&trees.source, "run.sh", "#!/bin/sh\n");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();

        Executor::new().apply_plan(&plan_for(&trees, false), |_| true).unwrap();

        let mode = fs::metadata(trees.dest.join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[cfg(unix)]
    #[rstest]
    fn test_symlinks_are_recreated_not_followed(trees: Trees) {
        use std::os::unix::fs::symlink;
        use std::path::PathBuf;

        write_file(&trees.source, "real/file.txt", "data");
        symlink("real", trees.source.join("link")).unwrap();
        symlink("missing", trees.source.join("dangling")).unwrap();

        let plan = plan_for(&trees, false);
        assert_eq!(plan.action_for("link").unwrap().kind, ActionKind::Copy);
        assert_eq!(plan.action_for("dangling").unwrap().kind, ActionKind::Copy);

        let report = Executor::new().apply_plan(&plan, |_| true).unwrap();

        assert_eq!(fs::read_link(trees.dest.join("link")).unwrap(), PathBuf::from("real"));
        assert_eq!(fs::read_link(trees.dest.join("dangling")).unwrap(), PathBuf::from("missing"));
        assert_eq!(read(&trees.dest, "link/file.txt"), "data");
        assert_eq!(report.stats.copied, 3);

        assert!(plan_for(&trees, true).is_empty());
    }

    #[cfg(unix)]
    #[rstest]
    fn test_update_replaces_destination_link(trees: Trees) {
        use filetime::FileTime;
        use std::os::unix::fs::symlink;

        let outside = trees.source.parent().unwrap().join("outside.txt");
        fs::write(&outside, "untouched").unwrap();
        mkdir(&trees.dest, "");
        let link = trees.dest.join("note.txt");
        symlink(&outside, &link).unwrap();
        let old = FileTime::from_unix_time(1_000_000, 0);
        filetime::set_symlink_file_times(&link, old, old).unwrap();
        write_file(&trees.source, "note.txt", "fresh content");

        let plan = plan_for(&trees, false);
        assert_eq!(plan.action_for("note.txt").unwrap().kind, ActionKind::Update);

        Executor::new().apply_plan(&plan, |_| true).unwrap();

        assert_eq!(fs::read_to_string(&outside).unwrap(), "untouched");
        assert!(!fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(read(&trees.dest, "note.txt"), "fresh content");
    }

    #[rstest]
    fn test_replace_file_with_directory(trees: Trees) {
        write_file(&trees.source, "node/child.txt", "child");
        write_file(&trees.dest, "node", "was a file");

        let plan = plan_for(&trees, false);
        assert_eq!(plan.action_for("node").unwrap().kind, ActionKind::Replace);

        Executor::new().apply_plan(&plan, |_| true).unwrap();

        assert!(trees.dest.join("node").is_dir());
        assert_eq!(read(&trees.dest, "node/child.txt"), "child");
    }

    #[rstest]
    fn test_replace_directory_with_file(trees: Trees) {
        write_file(&trees.source, "node", "now a file");
        write_file(&trees.dest, "node/inner/old.txt", "old");

        let plan = plan_for(&trees, true);
        // The replace removes the subtree, so nothing beneath it is planned for deletion
        assert_eq!(plan.summary.deletes, 0);

        Executor::new().apply_plan(&plan, |_| true).unwrap();

        assert!(trees.dest.join("node").is_file());
        assert_eq!(read(&trees.dest, "node"), "now a file");
    }

    #[rstest]
    fn test_delete_tolerates_missing_target(trees: Trees) {
        write_file(&trees.dest, "gone/file.txt", "x");
        let plan = plan_for(&trees, true);

        fs::remove_dir_all(trees.dest.join("gone")).unwrap();

        let report = Executor::new().apply_plan(&plan, |_| true).unwrap();
        assert_eq!(report.stats.deleted, 2);
    }

    #[rstest]
    fn test_declined_actions_are_not_applied(trees: Trees) {
        write_file(&trees.source, "keep.txt", "new");
        write_file(&trees.dest, "extra.txt", "orphan");

        let plan = plan_for(&trees, true);
        let report = Executor::new()
            .apply_plan(&plan, |action| action.kind != ActionKind::Delete)
            .unwrap();

        assert!(trees.dest.join("extra.txt").exists());
        assert!(trees.dest.join("keep.txt").exists());
        assert_eq!(report.stats.declined, 1);
        assert_eq!(report.stats.deleted, 0);
    }

    #[rstest]
    fn test_failure_reports_progress(trees: Trees) {
        write_file(&trees.source, "a.txt", "a");
        write_file(&trees.source, "b.txt", "b");
        write_file(&trees.source, "c.txt", "c");
        let plan = plan_for(&trees, false);

        // Remove the second source file after planning
        fs::remove_file(trees.source.join("b.txt")).unwrap();

        let err = Executor::new().apply_plan(&plan, |_| true).unwrap_err();
        let pending: Vec<String> = err.pending_actions().iter().map(|a| a.relative_path.clone()).collect();
        assert_eq!(pending, vec!["c.txt"]);

        match err {
            SyncError::ActionFailed { index, action, plan: failed_plan, completed, source } => {
                assert_eq!(index, 1);
                assert_eq!(action.relative_path, "b.txt");
                assert_eq!(failed_plan.actions, plan.actions);
                assert_eq!(completed.records.len(), 1);
                assert_eq!(completed.records[0].action.relative_path, "a.txt");
                assert!(matches!(*source, SyncError::NotFound { .. }));
            }
            other => panic!("Expected ActionFailed, got {:?}", other),
        }
        assert!(trees.dest.join("a.txt").exists());
        assert!(!trees.dest.join("c.txt").exists());
    }

    #[rstest]
    fn test_root_failure_leaves_every_action_pending(trees: Trees) {
        write_file(&trees.source, "a.txt", "a");
        write_file(&trees.source, "b.txt", "b");
        let plan = plan_for(&trees, false);

        // A file now sits where the destination root should be created
        fs::write(&trees.dest, "not a directory").unwrap();

        let err = Executor::new().apply_plan(&plan, |_| true).unwrap_err();
        match &err {
            SyncError::ActionFailed { index: 0, plan: failed_plan, completed, .. } => {
                assert_eq!(failed_plan.actions.len(), 2);
                assert!(completed.records.is_empty());
            }
            other => panic!("Expected ActionFailed, got {:?}", other),
        }
        assert_eq!(err.pending_actions().len(), 2);
    }
}
