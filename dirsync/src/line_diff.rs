//! Line-level diff based on the longest common subsequence
//!
//! The table is `(|A|+1) x (|B|+1)` and the cost is `O(|A|*|B|)` in time and
//! space, which suits source and text files. Binary content has to be
//! filtered out by the caller; [`diff_files`] enforces a size ceiling.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SyncError};

/// Default ceiling for [`diff_files`] inputs
pub const DEFAULT_MAX_FILE_BYTES: u64 = 4 * 1024 * 1024;

/// Default ceiling on `(|A|+1) * (|B|+1)`; 64 Mi cells is 256 MiB of table
pub const DEFAULT_MAX_TABLE_CELLS: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Removed,
    Unchanged,
}

/// One line of diff output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub text: String,
}

impl DiffLine {
    pub fn added(text: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Added,
            text: text.into(),
        }
    }

    pub fn removed(text: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Removed,
            text: text.into(),
        }
    }

    pub fn unchanged(text: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Unchanged,
            text: text.into(),
        }
    }

    /// Unified-diff style marker
    pub fn prefix(&self) -> char {
        match self.kind {
            DiffKind::Added => '+',
            DiffKind::Removed => '-',
            DiffKind::Unchanged => ' ',
        }
    }
}

impl std::fmt::Display for DiffLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix(), self.text)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl DiffStats {
    pub fn from_lines(lines: &[DiffLine]) -> Self {
        lines.iter().fold(Self::default(), |mut stats, line| {
            match line.kind {
                DiffKind::Added => stats.added += 1,
                DiffKind::Removed => stats.removed += 1,
                DiffKind::Unchanged => stats.unchanged += 1,
            }
            stats
        })
    }
}

/// Options for loading files to diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Files larger than this are rejected with [`SyncError::TooLarge`]
    pub max_file_bytes: u64,
    /// Line pairs whose LCS table exceeds this many cells are rejected
    /// with [`SyncError::TooManyLines`]
    pub max_table_cells: u64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_table_cells: DEFAULT_MAX_TABLE_CELLS,
        }
    }
}

/// Diff of two files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub lines: Vec<DiffLine>,
    pub stats: DiffStats,
}

impl FileDiff {
    pub fn is_identical(&self) -> bool {
        self.stats.added == 0 && self.stats.removed == 0
    }
}

/// Compute the line diff of `a` against `b`
pub fn diff_lines<S: AsRef<str>>(a: &[S], b: &[S]) -> Vec<DiffLine> {
    let table = lcs_table(a, b);
    let anchors = anchors(a, b, &table);

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let (mut next_a, mut next_b) = (0, 0);

    for (i, j) in anchors {
        out.extend(a[next_a..i].iter().map(|l| DiffLine::removed(l.as_ref())));
        out.extend(b[next_b..j].iter().map(|l| DiffLine::added(l.as_ref())));
        out.push(DiffLine::unchanged(a[i].as_ref()));
        next_a = i + 1;
        next_b = j + 1;
    }

    out.extend(a[next_a..].iter().map(|l| DiffLine::removed(l.as_ref())));
    out.extend(b[next_b..].iter().map(|l| DiffLine::added(l.as_ref())));
    out
}

/// Like [`diff_lines`], but `None` when the table would exceed `max_cells`
pub fn try_diff_lines<S: AsRef<str>>(a: &[S], b: &[S], max_cells: u64) -> Option<Vec<DiffLine>> {
    match table_cells(a.len(), b.len()) {
        Some(cells) if cells <= max_cells => Some(diff_lines(a, b)),
        _ => None,
    }
}

/// Number of cells in the LCS table for inputs of these lengths
pub fn table_cells(len_a: usize, len_b: usize) -> Option<u64> {
    let rows = u64::try_from(len_a).ok()?.checked_add(1)?;
    let cols = u64::try_from(len_b).ok()?.checked_add(1)?;
    rows.checked_mul(cols)
}

/// Length of the longest common subsequence
pub fn lcs_len<S: AsRef<str>>(a: &[S], b: &[S]) -> usize {
    lcs_table(a, b).get(a.len(), b.len())
}

/// Load two files and diff their lines
pub fn diff_files(path_a: impl AsRef<Path>, path_b: impl AsRef<Path>, options: &DiffOptions) -> Result<FileDiff> {
    let text_a = load_text(path_a.as_ref(), options)?;
    let text_b = load_text(path_b.as_ref(), options)?;

    let lines_a = split_lines(&text_a);
    let lines_b = split_lines(&text_b);
    debug!(lines_a = lines_a.len(), lines_b = lines_b.len(), "diffing files");

    let Some(lines) = try_diff_lines(&lines_a, &lines_b, options.max_table_cells) else {
        return Err(SyncError::TooManyLines {
            path_a: path_a.as_ref().to_path_buf(),
            path_b: path_b.as_ref().to_path_buf(),
            cells: table_cells(lines_a.len(), lines_b.len()).unwrap_or(u64::MAX),
            limit: options.max_table_cells,
        });
    };
    let stats = DiffStats::from_lines(&lines);
    Ok(FileDiff { lines, stats })
}

/// Split on `\n`; a trailing newline does not produce an empty last line
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n').collect()
}

fn load_text(path: &Path, options: &DiffOptions) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| SyncError::from_io(path, e))?;
    if metadata.is_dir() {
        return Err(SyncError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    if metadata.len() > options.max_file_bytes {
        return Err(SyncError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: options.max_file_bytes,
        });
    }

    let bytes = fs::read(path).map_err(|e| SyncError::from_io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Row-major `(rows x cols)` table of prefix LCS lengths
struct LcsTable {
    cols: usize,
    cells: Vec<u32>,
}

impl LcsTable {
    fn get(&self, i: usize, j: usize) -> usize {
        self.cells[i * self.cols + j] as usize
    }
}

fn lcs_table<S: AsRef<str>>(a: &[S], b: &[S]) -> LcsTable {
    let cols = b.len() + 1;
    let mut cells = vec![0u32; (a.len() + 1) * cols];

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            cells[i * cols + j] = if a[i - 1].as_ref() == b[j - 1].as_ref() {
                cells[(i - 1) * cols + (j - 1)] + 1
            } else {
                cells[(i - 1) * cols + j].max(cells[i * cols + (j - 1)])
            };
        }
    }

    LcsTable { cols, cells }
}

/// Walk back from `(|A|, |B|)` collecting matched index pairs in ascending order.
/// Ties move along A first, which keeps the result deterministic.
fn anchors<S: AsRef<str>>(a: &[S], b: &[S], table: &LcsTable) -> Vec<(usize, usize)> {
    let (mut i, mut j) = (a.len(), b.len());
    let mut pairs = Vec::with_capacity(table.get(i, j));

    while i > 0 && j > 0 {
        if a[i - 1].as_ref() == b[j - 1].as_ref() {
            pairs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if table.get(i - 1, j) >= table.get(i, j - 1) {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    pairs.reverse();
    pairs
}
