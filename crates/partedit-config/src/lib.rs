//! Shared configuration for the partedit file editing toolkit.
//!
//! Configuration is layered by `ortho_config`: built-in defaults are
//! overridden by a configuration file, then by `PARTEDIT_*` environment
//! variables, then by command-line flags. Library consumers that do not need
//! layered loading can start from [`Config::default`] and adjust individual
//! fields.
//!
//! Durations are stored as millisecond counts so they round-trip through every
//! layer unchanged; the accessors convert them into [`Duration`] values.

mod defaults;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CHUNK_SIZE, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_RETRY_MAX_RETRIES,
    default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration shared by the editor facade and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PARTEDIT")]
pub struct Config {
    /// How long a transaction waits for the per-file lock, in milliseconds.
    #[serde(default = "defaults::lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Whether transactions snapshot the target before mutating it.
    #[serde(default = "defaults::create_backup")]
    pub create_backup: bool,
    /// Chunk size used by streaming operations, in bytes.
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,
    /// Largest target file the editor facade accepts, in bytes.
    #[serde(default = "defaults::max_file_size")]
    pub max_file_size: u64,
    /// Additional attempts made when a lock cannot be acquired in time.
    #[serde(default = "defaults::retry_max_retries")]
    pub retry_max_retries: u32,
    /// First backoff delay between lock attempts, in milliseconds.
    #[serde(default = "defaults::retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound on any single backoff delay, in milliseconds.
    #[serde(default = "defaults::retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// `tracing` filter expression applied by telemetry.
    #[serde(default = "defaults::log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            create_backup: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            retry_max_retries: DEFAULT_RETRY_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            log_filter: defaults::log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Lock acquisition timeout for transactions.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Whether transactions create a backup before mutating the target.
    #[must_use]
    pub const fn create_backup(&self) -> bool {
        self.create_backup
    }

    /// Streaming chunk size in bytes; never zero.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// Maximum accepted target size in bytes.
    #[must_use]
    pub const fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Number of retries applied to lock acquisition.
    #[must_use]
    pub const fn retry_max_retries(&self) -> u32 {
        self.retry_max_retries
    }

    /// Base delay of the exponential backoff.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Cap applied to every backoff delay.
    #[must_use]
    pub const fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
