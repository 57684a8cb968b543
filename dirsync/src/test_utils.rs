//! Helpers for building scratch trees in tests

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::FileTime;

use crate::inventory::join_relative;

/// Base timestamp for deterministic modification times
pub const BASE_SECS: u64 = 1_000_000;

/// Write `content` to `root/relative`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = join_relative(root, relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Create `root/relative` as a directory
pub fn mkdir(root: &Path, relative: &str) -> PathBuf {
    let path = join_relative(root, relative);
    fs::create_dir_all(&path).unwrap();
    path
}

/// Set the modification time of `root/relative` to `BASE_SECS + offset_secs`
pub fn set_mtime(root: &Path, relative: &str, offset_secs: i64) {
    let secs = (BASE_SECS as i64 + offset_secs) as u64;
    let time = FileTime::from_system_time(SystemTime::UNIX_EPOCH + Duration::from_secs(secs));
    filetime::set_file_mtime(join_relative(root, relative), time).unwrap();
}

/// Read `root/relative` as a string
pub fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(join_relative(root, relative)).unwrap()
}

/// Snapshot a tree as sorted `(path, Some(content))` pairs, `None` for directories
pub fn snapshot(root: &Path) -> Vec<(String, Option<String>)> {
    let inv = crate::inventory::inventory(root, true).unwrap();
    inv.iter()
        .map(|entry| {
            let content = if entry.is_directory {
                None
            } else {
                Some(read(root, &entry.relative_path))
            };
            (entry.relative_path.clone(), content)
        })
        .collect()
}
