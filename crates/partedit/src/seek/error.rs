use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures from byte-addressed editing.
#[derive(Debug, Error)]
pub enum SeekError {
    /// A write was attempted through an editor opened read-only.
    #[error("'{path}' was opened read-only")]
    ReadOnly {
        /// File opened without write access.
        path: PathBuf,
    },

    /// The byte range is inverted or extends past the end of the file.
    #[error("byte range {start}..{end} is invalid for a file of {size} bytes")]
    InvalidRange {
        /// Range start.
        start: u64,
        /// Range end.
        end: u64,
        /// File size when the range was checked.
        size: u64,
    },

    /// An IO operation on the file failed.
    #[error("IO error on '{path}': {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
