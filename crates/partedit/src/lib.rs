//! Safe partial editing of large files.
//!
//! The crate lets automated agents change parts of large files without loading
//! them whole and without ever leaving a target half-written:
//!
//! - [`safety`] serialises writers with a cross-process lock on
//!   `<target>.lock`, snapshots the target, stages new content beside it, and
//!   publishes with a single atomic rename. Any failure restores the
//!   snapshot.
//! - [`line_index`] maps line numbers to byte offsets for constant-time line
//!   reads, rebuilding after each structural change.
//! - [`seek`] and [`stream`] provide byte-addressed and sequential access with
//!   bounded memory; [`mapped`] searches a memory-mapped file and rewrites
//!   patterns of equal length in place.
//! - [`retry`] and [`monitor`] add bounded backoff for lock contention and
//!   per-operation timing.
//! - [`editor`] combines all of the above into [`FileEditor`], whose calls are
//!   timed and recorded in an [`OperationLog`].
//!
//! Configuration lives in the `partedit-config` crate; [`telemetry`] installs
//! a `tracing` subscriber from it.

pub mod audit;
pub mod editor;
pub mod line_index;
pub mod mapped;
pub mod monitor;
pub mod retry;
pub mod safety;
pub mod seek;
mod splice;
pub mod stream;
pub mod telemetry;

pub use audit::{OperationKind, OperationLog, OperationRecord};
pub use editor::{EditorError, EditorOptions, FileEditor};
pub use line_index::{LineIndex, LineIndexError};
pub use mapped::{MappedError, MappedFile};
pub use monitor::{OperationStats, PerformanceMonitor};
pub use retry::RetryPolicy;
pub use safety::{FileTransaction, TransactionError, TransactionOptions};
pub use seek::{SeekEditor, SeekError};
pub use stream::{StreamEditor, copy_with_transform};

#[cfg(test)]
mod tests;
