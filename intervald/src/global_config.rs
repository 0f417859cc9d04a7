// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::error::ConfigError;
use crate::job_engine::{SchedulerConfig, DEFAULT_MAX_WORKERS};
use crate::logging::{
    LoggingConfig, Severity, DEFAULT_BACKUP_COUNT, DEFAULT_LOGGER_NAME, DEFAULT_LOG_FILE,
    DEFAULT_MAX_BYTES,
};

pub const DEFAULT_DRAIN_TIMEOUT_SECS: f64 = 30.0;

/// Daemon configuration. Every option can also be given as an environment variable.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct AppConfig {
    /// Number of worker threads running jobs
    #[arg(long, env = "SCHEDULER_MAX_WORKERS", default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Evaluate only the latest of several missed ticks
    #[arg(
        long,
        env = "SCHEDULER_COALESCE",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub coalesce: bool,

    /// Path of the rotating log file
    #[arg(long, env = "LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Size in bytes at which the log file is rotated (0 disables rotation)
    #[arg(long, env = "LOG_MAX_BYTES", default_value_t = DEFAULT_MAX_BYTES)]
    pub log_max_bytes: u64,

    /// Number of rotated log files to keep
    #[arg(long, env = "LOG_BACKUP_COUNT", default_value_t = DEFAULT_BACKUP_COUNT)]
    pub log_backup_count: usize,

    /// Minimum severity written to the log sinks
    #[arg(long, env = "LOG_LEVEL", value_enum, ignore_case = true, default_value_t = Severity::Info)]
    pub log_level: Severity,

    /// Seconds to wait for running jobs on shutdown
    #[arg(long, env = "SHUTDOWN_DRAIN_SECONDS", default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            coalesce: false,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            log_max_bytes: DEFAULT_MAX_BYTES,
            log_backup_count: DEFAULT_BACKUP_COUNT,
            log_level: Severity::Info,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if !self.drain_timeout.is_finite() || self.drain_timeout < 0.0 {
            return Err(ConfigError::InvalidDrainTimeout(self.drain_timeout));
        }
        Ok(())
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            logger_name: DEFAULT_LOGGER_NAME.to_string(),
            threshold: self.log_level,
            file_path: self.log_file.clone(),
            max_bytes: self.log_max_bytes,
            backup_count: self.log_backup_count,
            console: true,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_workers: self.max_workers,
            coalesce: self.coalesce,
        }
    }

    /// Only meaningful after `validate()` succeeded.
    pub fn drain_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.drain_timeout).unwrap_or(Duration::ZERO)
    }
}
