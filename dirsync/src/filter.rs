//! Exclude filtering using globset

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{Result, SyncError};

/// Exclude patterns matched against inventory paths
#[derive(Debug, Clone)]
pub struct PathFilter {
    exclude_set: GlobSet,
    patterns: Vec<String>,
}

impl PathFilter {
    /// Compile a filter from glob patterns. Returns `None` when there is nothing to exclude.
    pub fn new(patterns: &[String], case_sensitive: bool) -> Result<Option<Self>> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let exclude_set = Self::build_globset(patterns, case_sensitive)?;
        Ok(Some(Self {
            exclude_set,
            patterns: patterns.to_vec(),
        }))
    }

    /// Check a `/`-separated relative path. A pattern matches either the
    /// whole relative path or the entry's base name.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        if self.exclude_set.is_match(relative_path) {
            return true;
        }

        match relative_path.rsplit_once('/') {
            Some((_, name)) => self.exclude_set.is_match(name),
            None => false,
        }
    }

    /// The source patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn build_globset(patterns: &[String], case_sensitive: bool) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| {
                    SyncError::FilterPattern(format!("Failed to compile glob '{}': {}", pattern, e))
                })?;

            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| SyncError::FilterPattern(format!("Failed to build globset: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn filter(patterns: &[&str]) -> PathFilter {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        PathFilter::new(&patterns, true).unwrap().unwrap()
    }

    #[test]
    fn test_empty_patterns_build_no_filter() {
        assert!(PathFilter::new(&[], true).unwrap().is_none());
    }

    #[test_case("build.tmp", true ; "top level extension")]
    #[test_case("nested/dir/build.tmp", true ; "nested extension")]
    #[test_case("node_modules", true ; "top level name")]
    #[test_case("web/node_modules", true ; "nested name")]
    #[test_case("src/main.rs", false ; "unrelated file")]
    fn test_is_excluded(path: &str, expected: bool) {
        let f = filter(&["*.tmp", "node_modules"]);
        assert_eq!(f.is_excluded(path), expected);
    }

    #[test]
    fn test_case_insensitive_matching() {
        let patterns = vec!["*.LOG".to_string()];
        let f = PathFilter::new(&patterns, false).unwrap().unwrap();
        assert!(f.is_excluded("logs/app.log"));
    }

    #[test]
    fn test_invalid_pattern() {
        let patterns = vec!["[unclosed".to_string()];
        let result = PathFilter::new(&patterns, true);
        assert!(matches!(result, Err(SyncError::FilterPattern(_))));
    }
}
