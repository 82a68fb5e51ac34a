use crate::logging::LogFormat;

/// Default lock acquisition timeout in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

/// Default streaming chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default upper bound on target file size in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default number of lock acquisition retries.
pub const DEFAULT_RETRY_MAX_RETRIES: u32 = 3;

/// Default base backoff delay in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Default backoff cap in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// serde default hooks; serde needs owned values and plain function paths.

pub(crate) const fn lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

pub(crate) const fn create_backup() -> bool {
    true
}

pub(crate) const fn chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

pub(crate) const fn max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

pub(crate) const fn retry_max_retries() -> u32 {
    DEFAULT_RETRY_MAX_RETRIES
}

pub(crate) const fn retry_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

pub(crate) const fn retry_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_DELAY_MS
}

pub(crate) fn log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}
