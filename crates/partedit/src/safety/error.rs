//! Error types for guarded file transactions.
//!
//! Lock contention is the only recoverable failure; every other variant means
//! the attempt is over. [`TransactionError::RestoreFailed`] is the one case
//! where the target may be left in neither its old nor its new state.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced while opening, using, or closing a [`FileTransaction`].
///
/// [`FileTransaction`]: super::FileTransaction
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Another holder kept the lock for longer than the timeout.
    #[error("timed out after {timeout:?} waiting for lock '{lock}'")]
    LockTimeout {
        /// Lock file that could not be acquired.
        lock: PathBuf,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The operating system refused to open or lock the lock file.
    #[error("failed to acquire lock '{lock}': {source}")]
    LockAcquisition {
        /// Lock file that could not be acquired.
        lock: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Snapshotting the target before mutation failed.
    #[error("failed to back up '{path}' to '{backup}': {source}")]
    Backup {
        /// Target being backed up.
        path: PathBuf,
        /// Backup destination.
        backup: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Creating or writing the private staging file failed.
    #[error("failed to prepare staging file for '{path}': {source}")]
    Staging {
        /// Target the staging file belongs to.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// `atomic_replace` was asked to publish a file that does not exist.
    #[error("staged source '{path}' does not exist")]
    SourceNotFound {
        /// Missing source path.
        path: PathBuf,
    },

    /// Renaming staged content over the target failed.
    #[error("failed to replace '{target}' with '{staging}': {source}")]
    Replace {
        /// Staged source.
        staging: PathBuf,
        /// Target path.
        target: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Rolling back to the backup failed; the target may be inconsistent.
    #[error(
        "failed to restore '{target}' from backup '{backup}' after {cause}: {source}; \
         the target may be inconsistent"
    )]
    RestoreFailed {
        /// Target that could not be restored.
        target: PathBuf,
        /// Backup that was being moved back.
        backup: PathBuf,
        /// Description of the failure that triggered the rollback.
        cause: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Rolling back could not remove a target the transaction had created.
    #[error("failed to remove '{target}' created before {cause}: {source}")]
    RemoveCreated {
        /// Target that was created by the transaction.
        target: PathBuf,
        /// Description of the failure that triggered the rollback.
        cause: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl TransactionError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Only lock contention qualifies; it is the default retry predicate used
    /// by the editor facade.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
