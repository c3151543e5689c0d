// src/logging.rs

//! Application logging.
//!
//! rclown's own events are shown at the chosen level while dependencies
//! (`reqwest`, `hyper`, ...) are held at `warn`, so a `debug` run is not
//! flooded with HTTP internals. Run-scoped events carry the `run` span
//! (`backup`, `run_id`) set up by the executor.
//!
//! Filter selection:
//! 1. `--log-level` sets rclown's level.
//! 2. Otherwise `RCLOWN_LOG` is used as a full filter, e.g.
//!    `RCLOWN_LOG=rclown::exec=trace,reqwest=debug`. A bare level such as
//!    `debug` applies to rclown only.
//! 3. Otherwise `info`.
//!
//! Output goes to stderr; stdout stays free for command output (`status`,
//! `size`, `log`, `check`).

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Env var holding a filter for `rclown` when `--log-level` is not given.
pub const LOG_ENV: &str = "RCLOWN_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env.as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("installing log subscriber")?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> Result<EnvFilter> {
    let directives = match (cli_level, env.map(str::trim).filter(|s| !s.is_empty())) {
        (Some(lvl), _) => default_directives(level_from_log_level(lvl)),
        (None, Some(spec)) => match parse_level_str(spec) {
            Some(level) => default_directives(level),
            None => spec.to_string(),
        },
        (None, None) => default_directives(Level::INFO),
    };
    EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter '{directives}' (from {LOG_ENV})"))
}

/// rclown at `level`, everything else at `warn`.
fn default_directives(level: Level) -> String {
    format!("warn,rclown={}", level.as_str().to_lowercase())
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
