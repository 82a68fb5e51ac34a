use std::time::Duration;

use partedit_config::{Config, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE};

use crate::retry::RetryPolicy;
use crate::safety::TransactionOptions;

/// Settings applied to every [`FileEditor`](super::FileEditor) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorOptions {
    transaction: TransactionOptions,
    retry: RetryPolicy,
    chunk_size: usize,
    max_file_size: u64,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            transaction: TransactionOptions::new(),
            retry: RetryPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl EditorOptions {
    /// Reads every setting from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            transaction: TransactionOptions::new()
                .with_timeout(config.lock_timeout())
                .with_backup(config.create_backup()),
            retry: RetryPolicy::from_config(config),
            chunk_size: config.chunk_size(),
            max_file_size: config.max_file_size(),
        }
    }

    /// Sets the lock timeout of each transaction.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.transaction = self.transaction.with_timeout(timeout);
        self
    }

    /// Enables or disables backups.
    #[must_use]
    pub const fn with_backup(mut self, create_backup: bool) -> Self {
        self.transaction = self.transaction.with_backup(create_backup);
        self
    }

    /// Sets how lock timeouts are retried.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the streaming chunk size (at least one byte).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets the largest target accepted, in bytes.
    #[must_use]
    pub const fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Options passed to each transaction.
    #[must_use]
    pub const fn transaction(&self) -> TransactionOptions {
        self.transaction
    }

    /// Retry policy for opening transactions.
    #[must_use]
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Streaming chunk size in bytes.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Largest target accepted, in bytes.
    #[must_use]
    pub const fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}
