//! Set comparison of two directory inventories

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::inventory::{Entry, Inventory, InventoryOptions};

/// Partition of two inventories by relative path
#[derive(Debug, Clone, Default, Serialize)]
pub struct Comparison {
    /// Present only in the first directory
    pub only_in_a: Vec<Entry>,
    /// Present only in the second directory
    pub only_in_b: Vec<Entry>,
    /// Present in both; carries the first directory's entry
    pub common: Vec<Entry>,
}

impl Comparison {
    /// Partition two already-built inventories
    pub fn between(a: &Inventory, b: &Inventory) -> Self {
        let mut comparison = Self::default();

        // Both maps iterate in ascending path order, so the output lists stay sorted.
        for entry in a.iter() {
            if b.contains(&entry.relative_path) {
                comparison.common.push(entry.clone());
            } else {
                comparison.only_in_a.push(entry.clone());
            }
        }

        comparison.only_in_b = b
            .iter()
            .filter(|entry| !a.contains(&entry.relative_path))
            .cloned()
            .collect();

        comparison
    }

    /// True when neither side has entries the other lacks
    pub fn is_identical_layout(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }
}

/// Compare two directories' inventories
pub fn compare(
    dir_a: impl AsRef<Path>,
    dir_b: impl AsRef<Path>,
    include_hidden: bool,
) -> Result<Comparison> {
    compare_with(dir_a.as_ref(), dir_b.as_ref(), &InventoryOptions::new(include_hidden))
}

/// Compare two directories with full inventory options
pub fn compare_with(dir_a: &Path, dir_b: &Path, options: &InventoryOptions) -> Result<Comparison> {
    let a = Inventory::scan(dir_a, options)?;
    let b = Inventory::scan(dir_b, options)?;
    let comparison = Comparison::between(&a, &b);

    debug!(
        only_in_a = comparison.only_in_a.len(),
        only_in_b = comparison.only_in_b.len(),
        common = comparison.common.len(),
        "comparison complete"
    );

    Ok(comparison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::inventory::inventory;
    use crate::test_utils::{mkdir, write_file};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.relative_path.as_str()).collect()
    }

    #[test]
    fn test_partition() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");

        write_file(&a, "shared.txt", "from a");
        write_file(&a, "zeta.txt", "a only");
        write_file(&a, "alpha.txt", "a only");
        write_file(&b, "shared.txt", "from b, longer");
        write_file(&b, "beta.txt", "b only");
        mkdir(&b, "docs");

        let result = compare(&a, &b, false).unwrap();

        assert_eq!(names(&result.only_in_a), vec!["alpha.txt", "zeta.txt"]);
        assert_eq!(names(&result.only_in_b), vec!["beta.txt", "docs"]);
        assert_eq!(names(&result.common), vec!["shared.txt"]);
        // Representative entry comes from the first directory
        assert_eq!(result.common[0].size, 6);
        assert!(!result.is_identical_layout());
    }

    #[test]
    fn test_hidden_entries_follow_flag() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        write_file(&a, ".hidden", "x");
        mkdir(&b, "");

        assert!(compare(&a, &b, false).unwrap().is_identical_layout());
        assert_eq!(names(&compare(&a, &b, true).unwrap().only_in_a), vec![".hidden"]);
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = compare(temp_dir.path(), temp_dir.path().join("missing"), false);
        assert!(matches!(result, Err(SyncError::NotFound { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn test_partition_is_complete(
            files_a in prop::collection::btree_set("[a-d]{1,2}(/[a-d]{1,2})?", 0..8),
            files_b in prop::collection::btree_set("[a-d]{1,2}(/[a-d]{1,2})?", 0..8),
        ) {
            let temp_dir = TempDir::new().unwrap();
            let a = mkdir(temp_dir.path(), "a");
            let b = mkdir(temp_dir.path(), "b");
            for f in &files_a {
                // A path can't be both a file and the parent of another file
                if files_a.iter().any(|other| other.starts_with(&format!("{}/", f))) {
                    continue;
                }
                write_file(&a, f, "a");
            }
            for f in &files_b {
                if files_b.iter().any(|other| other.starts_with(&format!("{}/", f))) {
                    continue;
                }
                write_file(&b, f, "b");
            }

            let result = compare(&a, &b, false).unwrap();
            let inv_a = inventory(&a, false).unwrap();
            let inv_b = inventory(&b, false).unwrap();

            prop_assert_eq!(result.only_in_a.len() + result.common.len(), inv_a.len());
            prop_assert_eq!(result.only_in_b.len() + result.common.len(), inv_b.len());
        }
    }
}
