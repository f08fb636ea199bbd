//! CLI argument definitions for the Synapse binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Synapse: a chat companion that remembers what you tell it.
#[derive(Parser, Debug)]
#[command(name = "synapse", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the turn log.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Chat interactively on stdin/stdout.
    Chat {
        #[arg(short = 'u', long = "user")]
        user: String,
        /// Session to resume; a new one is started when omitted.
        #[arg(short = 's', long = "session")]
        session: Option<String>,
    },
    /// Print the recent turns of a session.
    History {
        #[arg(short = 'u', long = "user")]
        user: String,
        #[arg(short = 's', long = "session")]
        session: String,
        /// Number of turns (defaults to `memory.history_limit`).
        #[arg(short = 'n', long = "limit")]
        limit: Option<usize>,
    },
    /// Print the facts remembered for a session.
    Facts {
        #[arg(short = 'u', long = "user")]
        user: String,
        #[arg(short = 's', long = "session")]
        session: String,
    },
    /// List a user's sessions in the working set.
    Sessions {
        #[arg(short = 'u', long = "user")]
        user: String,
    },
    /// Print memory statistics as JSON.
    Stats,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SYNAPSE_CONFIG env var > ./synapse.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SYNAPSE_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("synapse.toml")
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > config file value. `~/` expands to the
    /// home directory.
    pub fn resolve_data_dir(&self, config_data_dir: &str) -> PathBuf {
        match self.data_dir {
            Some(ref p) => p.clone(),
            None => expand_home(config_data_dir),
        }
    }

    /// Resolve the tracing filter directive.
    ///
    /// Priority: --log-level flag > RUST_LOG > config file value > "info".
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                return filter;
            }
        }
        if !config_level.trim().is_empty() {
            return config_level.to_string();
        }
        "info".to_string()
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}
