// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present Ouroboros-rs Contributors

//! Configuration management for the IRMd daemon.
//!
//! Supports both command-line arguments and an optional TOML
//! configuration file; the file, if given, wins over individual flags.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

pub fn default_irm_sock_path() -> String {
    "/tmp/ouroboros/irm.sock".to_string()
}

fn default_lockfile_path() -> String {
    "/tmp/ouroboros/irmd.lock".to_string()
}

fn default_socket_timeout_ms() -> u64 {
    2_000
}

fn default_cleanup_timer_ms() -> u64 {
    1_000
}

fn default_flow_timeout_ms() -> u64 {
    5_000
}

fn default_min_threads() -> usize {
    4
}

fn default_add_threads() -> usize {
    2
}

fn default_dir_hash_algo() -> String {
    "blake3-16".to_string()
}

/// Command-line arguments for the IRMd daemon.
#[derive(Parser, Debug)]
#[command(name = "irmd")]
#[command(author = "Ouroboros-rs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "IPC Resource Manager daemon", long_about = None)]
pub struct CliArgs {
    /// Path to a TOML configuration file (overrides other arguments).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// UNIX-domain control socket path.
    #[arg(long, value_name = "PATH")]
    pub irm_sock_path: Option<String>,

    /// Single-instance lockfile path.
    #[arg(long, value_name = "PATH")]
    pub lockfile_path: Option<String>,

    /// Milliseconds to wait for a spawned IPCP's `ipcp_create_r` before
    /// SIGKILLing it.
    #[arg(long, value_name = "MS")]
    pub socket_timeout_ms: Option<u64>,

    /// Period, in milliseconds, of the IRM sanitiser sweep.
    #[arg(long, value_name = "MS")]
    pub cleanup_timer_ms: Option<u64>,

    /// Milliseconds an `alloc-pending` flow may sit before the sanitiser
    /// ages it into `dealloc-pending`.
    #[arg(long, value_name = "MS")]
    pub flow_timeout_ms: Option<u64>,

    /// Minimum worker-pool thread count.
    #[arg(long, value_name = "N")]
    pub min_threads: Option<usize>,

    /// Threads added to the pool when every worker is busy.
    #[arg(long, value_name = "N")]
    pub add_threads: Option<usize>,

    /// Default directory hash algorithm for newly spawned IPCPs.
    #[arg(long, value_name = "ALGO")]
    pub dir_hash_algo: Option<String>,
}

/// TOML configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub irmd: IrmdSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrmdSection {
    #[serde(default = "default_irm_sock_path")]
    pub irm_sock_path: String,
    #[serde(default = "default_lockfile_path")]
    pub lockfile_path: String,
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
    #[serde(default = "default_cleanup_timer_ms")]
    pub cleanup_timer_ms: u64,
    #[serde(default = "default_flow_timeout_ms")]
    pub flow_timeout_ms: u64,
    #[serde(default = "default_min_threads")]
    pub min_threads: usize,
    #[serde(default = "default_add_threads")]
    pub add_threads: usize,
    #[serde(default = "default_dir_hash_algo")]
    pub dir_hash_algo: String,
}

impl Default for IrmdSection {
    fn default() -> Self {
        IrmdSection {
            irm_sock_path: default_irm_sock_path(),
            lockfile_path: default_lockfile_path(),
            socket_timeout_ms: default_socket_timeout_ms(),
            cleanup_timer_ms: default_cleanup_timer_ms(),
            flow_timeout_ms: default_flow_timeout_ms(),
            min_threads: default_min_threads(),
            add_threads: default_add_threads(),
            dir_hash_algo: default_dir_hash_algo(),
        }
    }
}

/// Resolved, validated configuration the daemon runs with.
#[derive(Debug, Clone)]
pub struct IrmdConfig {
    pub irm_sock_path: String,
    pub lockfile_path: String,
    pub socket_timeout: std::time::Duration,
    pub cleanup_timer: std::time::Duration,
    pub flow_timeout: std::time::Duration,
    pub min_threads: usize,
    pub add_threads: usize,
    pub dir_hash_algo: String,
}

impl IrmdConfig {
    /// Builds a config from CLI args alone, falling back to defaults for
    /// anything not given on the command line (or loads a file if `-c`
    /// was passed).
    pub fn from_cli(args: CliArgs) -> Result<Self, ConfigError> {
        if let Some(path) = &args.config {
            let mut cfg = Self::from_file(path)?;
            if let Some(v) = args.irm_sock_path {
                cfg.irm_sock_path = v;
            }
            if let Some(v) = args.lockfile_path {
                cfg.lockfile_path = v;
            }
            if let Some(v) = args.socket_timeout_ms {
                cfg.socket_timeout = std::time::Duration::from_millis(v);
            }
            if let Some(v) = args.cleanup_timer_ms {
                cfg.cleanup_timer = std::time::Duration::from_millis(v);
            }
            if let Some(v) = args.flow_timeout_ms {
                cfg.flow_timeout = std::time::Duration::from_millis(v);
            }
            if let Some(v) = args.min_threads {
                cfg.min_threads = v;
            }
            if let Some(v) = args.add_threads {
                cfg.add_threads = v;
            }
            if let Some(v) = args.dir_hash_algo {
                cfg.dir_hash_algo = v;
            }
            cfg.validate()?;
            return Ok(cfg);
        }

        let defaults = IrmdSection::default();
        let cfg = IrmdConfig {
            irm_sock_path: args.irm_sock_path.unwrap_or(defaults.irm_sock_path),
            lockfile_path: args.lockfile_path.unwrap_or(defaults.lockfile_path),
            socket_timeout: std::time::Duration::from_millis(
                args.socket_timeout_ms.unwrap_or(defaults.socket_timeout_ms),
            ),
            cleanup_timer: std::time::Duration::from_millis(
                args.cleanup_timer_ms.unwrap_or(defaults.cleanup_timer_ms),
            ),
            flow_timeout: std::time::Duration::from_millis(
                args.flow_timeout_ms.unwrap_or(defaults.flow_timeout_ms),
            ),
            min_threads: args.min_threads.unwrap_or(defaults.min_threads),
            add_threads: args.add_threads.unwrap_or(defaults.add_threads),
            dir_hash_algo: args.dir_hash_algo.unwrap_or(defaults.dir_hash_algo),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let toml_config: TomlConfig = toml::from_str(&contents)?;
        let section = toml_config.irmd;

        Ok(IrmdConfig {
            irm_sock_path: section.irm_sock_path,
            lockfile_path: section.lockfile_path,
            socket_timeout: std::time::Duration::from_millis(section.socket_timeout_ms),
            cleanup_timer: std::time::Duration::from_millis(section.cleanup_timer_ms),
            flow_timeout: std::time::Duration::from_millis(section.flow_timeout_ms),
            min_threads: section.min_threads,
            add_threads: section.add_threads,
            dir_hash_algo: section.dir_hash_algo,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.irm_sock_path.is_empty() {
            return Err(ConfigError::Invalid("irm_sock_path must not be empty".into()));
        }
        if self.min_threads == 0 {
            return Err(ConfigError::Invalid("min_threads must be at least 1".into()));
        }
        Ok(())
    }

    pub fn print_summary(&self) {
        tracing::info!(
            irm_sock_path = %self.irm_sock_path,
            lockfile_path = %self.lockfile_path,
            socket_timeout_ms = self.socket_timeout.as_millis() as u64,
            cleanup_timer_ms = self.cleanup_timer.as_millis() as u64,
            flow_timeout_ms = self.flow_timeout.as_millis() as u64,
            min_threads = self.min_threads,
            add_threads = self.add_threads,
            dir_hash_algo = %self.dir_hash_algo,
            "irmd configuration"
        );
    }
}
