//! Safe mutation primitives: per-file locking, backups, staging, and atomic
//! publication.
//!
//! Every mutation of a target file follows the same sequence. The exclusive
//! lock on `<target>.lock` is taken first, then the target is snapshotted to a
//! backup, new content is written to a private staging file in the same
//! directory, and finally the staging file is renamed over the target. Commit
//! deletes the backup; rollback moves it back. The lock is released last on
//! every path out of the transaction.
//!
//! The lock is advisory. It serialises writers that go through this module
//! (in any process) but does not stop programs that ignore it.

mod error;
mod lock;
mod paths;
mod transaction;

pub(crate) const SAFETY_TARGET: &str = "partedit::safety";

pub use error::TransactionError;
pub use lock::FileLock;
pub(crate) use paths::{create_staging, prepare_publish};
pub use paths::{backup_path_for, lock_path_for, parent_dir};
pub use transaction::{
    DEFAULT_LOCK_TIMEOUT,
    FileTransaction,
    TransactionOptions,
    TransactionReport,
    run,
};
