// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `rclown`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rclown",
    version,
    about = "Scheduled rclone backups between object storage buckets.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Defaults to `$RCLOWN_CONFIG`, then `Rclown.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RCLOWN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the scheduler loop until Ctrl-C.
    Serve,

    /// Run a single scheduler pass, then wait for the runs it started.
    Tick,

    /// Execute one backup now and wait for it to finish.
    Run {
        /// Backup id as written in `[backup.<id>]`.
        backup: String,

        /// Pass `--dry-run` to rclone; allowed alongside a live run.
        #[arg(long)]
        dry_run: bool,
    },

    /// Cancel the live run(s) of a backup.
    Cancel {
        backup: String,
    },

    /// Print object count and byte total of a storage location.
    Size {
        /// Storage id as written in `[storage.<id>]`.
        storage: String,

        /// Sub-path inside the bucket.
        #[arg(long)]
        path: Option<String>,

        /// rclone filter patterns to exclude.
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Purge expired files from every backup's deletion-retention area.
    Cleanup,

    /// Show schedule and last-run information for every backup.
    Status,

    /// Print the log of one run.
    Log {
        run_id: u64,

        /// Only the last N lines.
        #[arg(long)]
        lines: Option<usize>,
    },

    /// Send a test notification through one notifier.
    TestNotifier {
        notifier: String,
    },

    /// Parse + validate the config and print it, without running anything.
    Check,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
