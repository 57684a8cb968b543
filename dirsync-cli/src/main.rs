use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dirsync::{ActionKind, FileDiff, SyncAction, SyncEngine, SyncError};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod render;

use config::{default_config_path, expand_tilde, CliConfig};

#[derive(Parser)]
#[command(name = "dirsync")]
#[command(about = "Synchronize, compare and diff directory trees")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Make the destination mirror the source
    Sync {
        /// Source directory
        source: PathBuf,

        /// Destination directory
        dest: PathBuf,

        /// Show the plan without applying it
        #[arg(long)]
        dry_run: bool,

        /// Delete destination entries missing from the source
        #[arg(long)]
        delete: bool,

        /// Leave destination files alone when the source copy is newer
        #[arg(long)]
        skip_newer: bool,

        /// Never touch paths that already exist at the destination
        #[arg(long)]
        skip_existing: bool,

        /// Include hidden entries
        #[arg(long)]
        hidden: bool,

        /// Glob pattern to exclude (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Do not ask before deleting
        #[arg(short, long)]
        yes: bool,

        /// Print the plan or report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List entries unique to each directory and common to both
    Compare {
        dir_a: PathBuf,
        dir_b: PathBuf,

        /// Include hidden entries
        #[arg(long)]
        hidden: bool,

        /// Print the comparison as JSON
        #[arg(long)]
        json: bool,
    },
    /// Line diff of two text files
    Diff {
        file_a: PathBuf,
        file_b: PathBuf,

        /// Print the diff as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigActions,
    },
}

#[derive(Subcommand)]
enum ConfigActions {
    /// Show current configuration
    Show,
    /// Generate default configuration
    Generate {
        /// Output path for configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, loaded_from) = CliConfig::load_or_default(cli.config.as_deref()).await?;
    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging(&log_level);

    match &loaded_from {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => debug!("No configuration file, using defaults"),
    }

    match cli.command {
        Commands::Sync {
            source,
            dest,
            dry_run,
            delete,
            skip_newer,
            skip_existing,
            hidden,
            exclude,
            yes,
            json,
        } => {
            let options = config
                .sync_options(expand_tilde(&source), expand_tilde(&dest))
                .delete_orphaned(delete || config.sync.delete_orphaned)
                .skip_newer(skip_newer || config.sync.skip_newer)
                .skip_existing(skip_existing || config.sync.skip_existing)
                .include_hidden(hidden || config.sync.include_hidden)
                .exclude(config.sync.exclude.iter().cloned().chain(exclude))
                .preview_only(dry_run);
            let ask = !yes && !dry_run && config.sync.confirm_deletes;
            run_sync(options, ask, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Compare {
            dir_a,
            dir_b,
            hidden,
            json,
        } => {
            let (dir_a, dir_b) = (expand_tilde(&dir_a), expand_tilde(&dir_b));
            let options = config
                .sync_options(dir_a.clone(), dir_b.clone())
                .include_hidden(hidden || config.sync.include_hidden)
                .inventory_options()?;

            let comparison =
                tokio::task::spawn_blocking(move || dirsync::comparator::compare_with(&dir_a, &dir_b, &options))
                    .await??;

            if json {
                render::print_json(&comparison)?;
            } else {
                render::print_comparison(&comparison);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Diff { file_a, file_b, json } => {
            let (file_a, file_b) = (expand_tilde(&file_a), expand_tilde(&file_b));
            let options = config.diff_options();

            let diff =
                tokio::task::spawn_blocking(move || dirsync::diff_files(&file_a, &file_b, &options)).await??;

            if json {
                render::print_json(&diff)?;
            } else {
                render::print_diff(&diff);
            }
            Ok(ExitCode::from(diff_status(&diff)))
        }
        Commands::Config { action } => {
            match action {
                ConfigActions::Show => println!("{}", toml::to_string_pretty(&config)?),
                ConfigActions::Generate { output } => generate_config(output).await?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `diff` exits with 1 when the files differ
fn diff_status(diff: &FileDiff) -> u8 {
    u8::from(!diff.is_identical())
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("dirsync={log_level},dirsync_cli={log_level}"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run_sync(options: dirsync::SyncOptions, ask: bool, json: bool) -> Result<()> {
    info!(
        source = %options.source_root.display(),
        dest = %options.dest_root.display(),
        preview = options.preview_only,
        "Starting sync"
    );

    let result = tokio::task::spawn_blocking(move || {
        let engine = SyncEngine::new(options);
        let mut prompt = DeletePrompt::new(ask);
        engine.run_with_confirm(|action| prompt.confirm(action))
    })
    .await?;

    let run = match result {
        Ok(run) => run,
        Err(err @ SyncError::ActionFailed { .. }) if !json => {
            render::print_partial(&err);
            return Err(err).context("sync stopped");
        }
        Err(e) => return Err(e).context("sync failed"),
    };

    if json {
        return render::print_json(&run);
    }

    match &run.report {
        Some(report) => render::print_report(report),
        None => render::print_preview(&run.plan),
    }
    Ok(())
}

/// Interactive confirmation for delete actions
struct DeletePrompt {
    ask: bool,
    accept_all: bool,
}

impl DeletePrompt {
    fn new(ask: bool) -> Self {
        Self {
            ask,
            accept_all: false,
        }
    }

    fn confirm(&mut self, action: &SyncAction) -> bool {
        if !self.ask || self.accept_all || action.kind != ActionKind::Delete {
            return true;
        }

        let mut stderr = io::stderr();
        // A failed prompt write or read declines the delete.
        if write!(stderr, "Delete {}? [y/N/a] ", action.dest_path.display())
            .and_then(|_| stderr.flush())
            .is_err()
        {
            return false;
        }

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }

        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => true,
            "a" | "all" => {
                self.accept_all = true;
                true
            }
            _ => false,
        }
    }
}

async fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = CliConfig::default();

    match output.map(|p| expand_tilde(&p)).or_else(default_config_path) {
        Some(path) => {
            config.save(&path).await?;
            println!("Configuration written to {}", path.display());
        }
        None => println!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delete_action() -> SyncAction {
        SyncAction {
            kind: ActionKind::Delete,
            relative_path: "old.txt".to_string(),
            source_path: None,
            dest_path: PathBuf::from("/dest/old.txt"),
            is_directory: false,
            size: 0,
            modified_at: std::time::SystemTime::UNIX_EPOCH,
            reason: "orphaned".to_string(),
        }
    }

    #[test]
    fn test_prompt_disabled_accepts_deletes() {
        let mut prompt = DeletePrompt::new(false);
        assert!(prompt.confirm(&delete_action()));
    }

    #[test]
    fn test_prompt_ignores_non_delete_actions() {
        let mut prompt = DeletePrompt::new(true);
        let mut action = delete_action();
        action.kind = ActionKind::Copy;
        assert!(prompt.confirm(&action));
    }

    #[test]
    fn test_cli_parses_sync_flags() {
        let cli = Cli::parse_from([
            "dirsync", "sync", "src", "dst", "--dry-run", "--delete", "-e", "*.tmp", "-e", "*.bak",
        ]);

        match cli.command {
            Commands::Sync {
                dry_run,
                delete,
                exclude,
                yes,
                ..
            } => {
                assert!(dry_run);
                assert!(delete);
                assert!(!yes);
                assert_eq!(exclude, vec!["*.tmp", "*.bak"]);
            }
            _ => panic!("expected sync command"),
        }
    }

    #[test]
    fn test_diff_status() {
        let same = dirsync::diff_lines(&["a"], &["a"]);
        let changed = dirsync::diff_lines(&["a"], &["b"]);
        let to_diff = |lines: Vec<dirsync::DiffLine>| FileDiff {
            stats: dirsync::DiffStats::from_lines(&lines),
            lines,
        };

        assert_eq!(diff_status(&to_diff(same)), 0);
        assert_eq!(diff_status(&to_diff(changed)), 1);
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["dirsync", "diff", "a.txt", "b.txt", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
