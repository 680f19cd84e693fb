//! CLI argument definitions for the Reveille binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use reveille_core::config::ReveilleConfig;
use std::path::PathBuf;

/// Reveille: alarm scheduling daemon driven by JSON method calls on stdin.
#[derive(Parser, Debug)]
#[command(name = "reveille", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Snooze delay in milliseconds.
    #[arg(long = "snooze-ms")]
    pub snooze_ms: Option<u64>,

    /// Stop an unanswered alarm after this many milliseconds (0 disables).
    #[arg(long = "ring-timeout-ms")]
    pub ring_timeout_ms: Option<u64>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > REVEILLE_CONFIG env var > ~/.reveille/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("REVEILLE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config: &ReveilleConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone())
    }

    /// Write flag overrides into the loaded configuration.
    pub fn apply(&self, config: &mut ReveilleConfig) {
        if let Some(ms) = self.snooze_ms {
            config.scheduling.snooze_delay_ms = ms;
        }
        if let Some(ms) = self.ring_timeout_ms {
            config.scheduling.ring_timeout_ms = ms;
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".reveille").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".reveille").join("config.toml");
    }
    PathBuf::from("config.toml")
}
