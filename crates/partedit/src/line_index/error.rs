//! Errors raised by [`LineIndex`](super::LineIndex).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures building, reading, or rewriting an indexed file.
#[derive(Debug, Error)]
pub enum LineIndexError {
    /// The indexed file does not exist.
    #[error("file '{path}' does not exist")]
    NotFound {
        /// Missing file.
        path: PathBuf,
    },

    /// A line number fell outside `0..line_count`.
    #[error("line {line} is out of range for a file with {line_count} lines")]
    OutOfRange {
        /// Requested 0-based line.
        line: usize,
        /// Lines in the index.
        line_count: usize,
    },

    /// Reading or rewriting the file failed.
    #[error("IO error on '{path}': {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl LineIndexError {
    pub(crate) fn io(target: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = target.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}
