//! Recursive tree inventory using walkdir

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{ensure_directory, Result, SyncError};
use crate::filter::PathFilter;

/// What to do when a single entry's metadata cannot be read during a walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryErrorPolicy {
    /// Log the failure and leave the entry out of the inventory
    #[default]
    Skip,
    /// Fail the whole inventory
    Abort,
}

/// Options for one inventory pass
#[derive(Debug, Clone, Default)]
pub struct InventoryOptions {
    /// Include entries whose name starts with `.`
    pub include_hidden: bool,
    /// Exclude patterns; matching directories are not descended into
    pub exclude: Option<PathFilter>,
    /// Per-entry error handling
    pub on_entry_error: EntryErrorPolicy,
}

impl InventoryOptions {
    pub fn new(include_hidden: bool) -> Self {
        Self {
            include_hidden,
            ..Default::default()
        }
    }
}

/// One filesystem object discovered during inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// `/`-separated path relative to the scanned root
    pub relative_path: String,
    pub is_directory: bool,
    /// Size in bytes, 0 for directories
    pub size: u64,
    pub modified_at: SystemTime,
    pub is_hidden: bool,
    /// Unix mode bits
    pub permissions: u32,
}

impl Entry {
    /// Base name of the entry
    pub fn name(&self) -> &str {
        self.relative_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.relative_path)
    }

    /// Modification time truncated to whole seconds relative to the Unix epoch
    pub fn modified_secs(&self) -> i64 {
        match self.modified_at.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => {
                let before = e.duration();
                // Round toward negative infinity so sub-second pre-epoch times stay ordered.
                -(before.as_secs() as i64) - i64::from(before.subsec_nanos() > 0)
            }
        }
    }

    /// Whether `self` lies strictly beneath the directory `ancestor`
    pub fn is_beneath(&self, ancestor: &str) -> bool {
        is_beneath(&self.relative_path, ancestor)
    }
}

/// Path to entry mapping for one root
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    root: PathBuf,
    entries: BTreeMap<String, Entry>,
}

impl Inventory {
    /// An inventory with no entries, used for a destination that does not exist yet
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Walk `root` and record every descendant
    #[tracing::instrument(skip_all, fields(root = %root.display()))]
    pub fn scan(root: &Path, options: &InventoryOptions) -> Result<Self> {
        ensure_directory(root)?;

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| should_descend(entry, root, options));

        let mut entries = BTreeMap::new();

        for result in walker {
            let dir_entry = match result {
                Ok(dir_entry) => dir_entry,
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    // The root itself could not be read
                    if err.depth() == 0 {
                        return Err(SyncError::io(path, err.into()));
                    }
                    handle_entry_error(options.on_entry_error, path, err.into())?;
                    continue;
                }
            };

            let metadata = match dir_entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    handle_entry_error(
                        options.on_entry_error,
                        dir_entry.path().to_path_buf(),
                        err.into(),
                    )?;
                    continue;
                }
            };

            let Some(relative_path) = relative_path(root, dir_entry.path()) else {
                continue;
            };

            let entry = make_entry(relative_path, &dir_entry, &metadata);
            entries.insert(entry.relative_path.clone(), entry);
        }

        debug!(entries = entries.len(), "inventory complete");

        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, relative_path: &str) -> Option<&Entry> {
        self.entries.get(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending path order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Relative paths in ascending order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Absolute path of an entry under this inventory's root
    pub fn absolute(&self, relative_path: &str) -> PathBuf {
        join_relative(&self.root, relative_path)
    }

    pub fn into_entries(self) -> BTreeMap<String, Entry> {
        self.entries
    }
}

/// Inventory `root`, optionally including hidden entries
pub fn inventory(root: impl AsRef<Path>, include_hidden: bool) -> Result<Inventory> {
    Inventory::scan(root.as_ref(), &InventoryOptions::new(include_hidden))
}

/// Join a `/`-separated relative path onto a host path
pub fn join_relative(root: &Path, relative_path: &str) -> PathBuf {
    relative_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Whether `path` lies strictly beneath the directory `ancestor`
pub(crate) fn is_beneath(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

fn should_descend(entry: &DirEntry, root: &Path, options: &InventoryOptions) -> bool {
    if !options.include_hidden && is_hidden_name(entry) {
        return false;
    }

    if let Some(filter) = &options.exclude {
        if let Some(relative) = relative_path(root, entry.path()) {
            if filter.is_excluded(&relative) {
                debug!(path = %relative, "excluded by pattern");
                return false;
            }
        }
    }

    true
}

fn handle_entry_error(policy: EntryErrorPolicy, path: PathBuf, err: std::io::Error) -> Result<()> {
    match policy {
        EntryErrorPolicy::Skip => {
            warn!("Skipping unreadable entry '{}': {}", path.display(), err);
            Ok(())
        }
        EntryErrorPolicy::Abort => Err(SyncError::io(path, err)),
    }
}

fn is_hidden_name(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Build the `/`-separated relative form of `path` under `root`
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let segments: Vec<_> = stripped
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn make_entry(relative_path: String, dir_entry: &DirEntry, metadata: &Metadata) -> Entry {
    let is_directory = metadata.is_dir();
    Entry {
        is_hidden: is_hidden_name(dir_entry),
        size: if is_directory { 0 } else { metadata.len() },
        modified_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        permissions: get_permissions(metadata),
        is_directory,
        relative_path,
    }
}

/// Get file permissions in a cross-platform way
#[cfg(unix)]
pub(crate) fn get_permissions(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
pub(crate) fn get_permissions(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}
