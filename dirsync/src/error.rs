//! Error types for the sync engine library

use std::io;
use std::path::{Path, PathBuf};

use crate::planner::{SyncAction, SyncPlan};
use crate::report::ExecutionReport;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type for inventory, planning, execution and diffing
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A root or input path does not exist
    #[error("Path not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    /// A root exists but is not a directory
    #[error("Not a directory: '{}'", path.display())]
    NotADirectory { path: PathBuf },

    /// A file input is a directory
    #[error("Not a file: '{}'", path.display())]
    NotAFile { path: PathBuf },

    /// Read, write or permission failure
    #[error("IO error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File exceeds the line-diff size ceiling
    #[error("File '{}' is too large to diff ({size} bytes, limit {limit})", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The LCS table for two files would exceed the cell ceiling
    #[error(
        "'{}' and '{}' have too many lines to diff ({cells} table cells, limit {limit})",
        path_a.display(),
        path_b.display()
    )]
    TooManyLines {
        path_a: PathBuf,
        path_b: PathBuf,
        cells: u64,
        limit: u64,
    },

    /// Exclude pattern errors
    #[error("Filter pattern error: {0}")]
    FilterPattern(String),

    /// An action failed while applying a plan. Actions before `index` were
    /// applied; see [`SyncError::pending_actions`] for the ones never attempted.
    #[error("Failed to apply action #{index} ({} {}): {source}", action.kind, action.dest_path.display())]
    ActionFailed {
        index: usize,
        action: Box<SyncAction>,
        plan: Box<SyncPlan>,
        completed: Box<ExecutionReport>,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Create an IO error carrying the offending path
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map an IO error, turning `NotFound` into [`SyncError::NotFound`]
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Actions of a failed plan that were never attempted
    pub fn pending_actions(&self) -> &[SyncAction] {
        let Self::ActionFailed { action, plan, completed, .. } = self else {
            return &[];
        };

        // The failed action follows the recorded ones unless the destination root itself failed
        let rest = plan.actions.get(completed.records.len()..).unwrap_or(&[]);
        match rest.split_first() {
            Some((first, tail)) if first == action.as_ref() => tail,
            _ => rest,
        }
    }

    /// Path the error refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound { path }
            | Self::NotADirectory { path }
            | Self::NotAFile { path }
            | Self::Io { path, .. }
            | Self::TooLarge { path, .. } => Some(path),
            Self::TooManyLines { path_b, .. } => Some(path_b),
            Self::ActionFailed { action, .. } => Some(&action.dest_path),
            Self::FilterPattern(_) => None,
        }
    }
}

/// Check that `path` exists and is a directory
pub(crate) fn ensure_directory(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| SyncError::from_io(path, e))?;
    if metadata.is_dir() {
        Ok(())
    } else {
        Err(SyncError::NotADirectory {
            path: path.to_path_buf(),
        })
    }
}
