use anyhow::{Context, Result};
use dirsync::{DiffOptions, EntryErrorPolicy, SyncOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub sync: SyncDefaults,
    #[serde(default)]
    pub diff: DiffSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDefaults {
    #[serde(default)]
    pub delete_orphaned: bool,
    #[serde(default)]
    pub skip_newer: bool,
    #[serde(default)]
    pub skip_existing: bool,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Ask before each orphan deletion
    #[serde(default = "default_confirm_deletes")]
    pub confirm_deletes: bool,
    #[serde(default)]
    pub on_entry_error: EntryErrorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffSettings {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_table_cells")]
    pub max_table_cells: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sync: SyncDefaults::default(),
            diff: DiffSettings::default(),
        }
    }
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            delete_orphaned: false,
            skip_newer: false,
            skip_existing: false,
            include_hidden: false,
            exclude: Vec::new(),
            confirm_deletes: default_confirm_deletes(),
            on_entry_error: EntryErrorPolicy::default(),
        }
    }
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_table_cells: default_max_table_cells(),
        }
    }
}

impl CliConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load the explicit path, else the default location if a file exists
    /// there, else built-in defaults. Also returns the file actually read.
    pub async fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let path = expand_tilde(path);
            return Ok((Self::load(&path).await?, Some(path)));
        }

        match default_config_path() {
            Some(path) if path.is_file() => Ok((Self::load(&path).await?, Some(path))),
            _ => Ok((Self::default(), None)),
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            max_file_bytes: self.diff.max_file_bytes,
            max_table_cells: self.diff.max_table_cells,
        }
    }

    /// Engine options for one run, starting from the file defaults
    pub fn sync_options(&self, source: PathBuf, dest: PathBuf) -> SyncOptions {
        SyncOptions::new(source, dest)
            .delete_orphaned(self.sync.delete_orphaned)
            .skip_newer(self.sync.skip_newer)
            .skip_existing(self.sync.skip_existing)
            .include_hidden(self.sync.include_hidden)
            .exclude(self.sync.exclude.iter().cloned())
            .on_entry_error(self.sync.on_entry_error)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dirsync").join("config.toml"))
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_confirm_deletes() -> bool { true }
fn default_max_file_bytes() -> u64 { dirsync::line_diff::DEFAULT_MAX_FILE_BYTES }
fn default_max_table_cells() -> u64 { dirsync::line_diff::DEFAULT_MAX_TABLE_CELLS }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
            [sync]
            delete_orphaned = true
            exclude = ["*.tmp"]
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "info");
        assert!(config.sync.delete_orphaned);
        assert!(config.sync.confirm_deletes);
        assert_eq!(config.sync.exclude, vec!["*.tmp".to_string()]);
        assert_eq!(config.diff.max_file_bytes, 4 * 1024 * 1024);
        assert_eq!(config.diff.max_table_cells, 64 * 1024 * 1024);
    }

    #[test]
    fn test_on_entry_error_parses() {
        let config: CliConfig = toml::from_str("[sync]\non_entry_error = \"abort\"\n").unwrap();
        assert_eq!(config.sync.on_entry_error, EntryErrorPolicy::Abort);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = CliConfig::default();
        config.sync.skip_newer = true;
        config.save(&path).await.unwrap();

        let (loaded, from) = CliConfig::load_or_default(Some(&path)).await.unwrap();
        assert!(loaded.sync.skip_newer);
        assert_eq!(from, Some(path));
    }

    #[test]
    fn test_sync_options_from_defaults() {
        let mut config = CliConfig::default();
        config.sync.include_hidden = true;
        let options = config.sync_options(PathBuf::from("a"), PathBuf::from("b"));

        assert!(options.include_hidden);
        assert!(!options.delete_orphaned);
        assert_eq!(options.source_root, PathBuf::from("a"));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/docs")), home.join("docs"));
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
    }
}
