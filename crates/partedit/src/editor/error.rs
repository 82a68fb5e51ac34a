//! Errors surfaced by [`FileEditor`](super::FileEditor) operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::line_index::LineIndexError;
use crate::mapped::MappedError;
use crate::safety::TransactionError;

/// Failures of a facade operation.
///
/// Whatever the variant, the target is either fully updated or left as it
/// was, except for [`TransactionError::RestoreFailed`], which says so.
#[derive(Debug, Error)]
pub enum EditorError {
    /// Locking, staging, publishing, or rolling back failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The line index could not be built or the line range was invalid.
    #[error(transparent)]
    LineIndex(#[from] LineIndexError),

    /// An in-place pattern replacement was rejected or failed.
    #[error(transparent)]
    Mapped(#[from] MappedError),

    /// The target exceeds the configured size limit.
    #[error("'{path}' is {size} bytes, above the {limit} byte limit")]
    FileTooLarge {
        /// Rejected target.
        path: PathBuf,
        /// Actual size in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// A byte range was inverted or extended past the end of the target.
    #[error("byte range {start}..{end} is invalid for '{path}' ({size} bytes)")]
    InvalidRange {
        /// Target file.
        path: PathBuf,
        /// Range start.
        start: u64,
        /// Range end.
        end: u64,
        /// Target size.
        size: u64,
    },

    /// Reading the target or writing the staged content failed.
    #[error("IO error on '{path}': {source}")]
    Io {
        /// Target file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl EditorError {
    /// Whether the same call may succeed if retried later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transaction(error) => error.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
