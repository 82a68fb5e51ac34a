//! Errors raised by [`MappedFile`](super::MappedFile).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures searching or rewriting a memory-mapped file.
#[derive(Debug, Error)]
pub enum MappedError {
    /// The mapped file does not exist.
    #[error("file '{path}' does not exist")]
    NotFound {
        /// Missing file.
        path: PathBuf,
    },

    /// A write was attempted through a read-only mapping.
    #[error("'{path}' is mapped read-only")]
    ReadOnly {
        /// File mapped without write access.
        path: PathBuf,
    },

    /// An in-place replacement would change the length of the file.
    #[error("replacement of {new} bytes cannot stand in for a {old} byte pattern")]
    LengthMismatch {
        /// Length of the searched pattern.
        old: usize,
        /// Length of the replacement.
        new: usize,
    },

    /// A write would run past the end of the mapping.
    #[error("writing {len} bytes at offset {offset} overruns '{path}' ({size} bytes)")]
    OutOfBounds {
        /// Mapped file.
        path: PathBuf,
        /// Requested write offset.
        offset: u64,
        /// Bytes to write.
        len: usize,
        /// Mapped size.
        size: u64,
    },

    /// Opening, mapping, resizing, or flushing the file failed.
    #[error("IO error on '{path}': {source}")]
    Io {
        /// Mapped file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl MappedError {
    pub(crate) fn io(target: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = target.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}
