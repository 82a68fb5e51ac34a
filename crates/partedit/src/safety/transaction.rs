//! Guarded mutation of a single file.
//!
//! A [`FileTransaction`] holds the per-file lock for its whole lifetime,
//! snapshots the target into a backup, hands out a private staging file, and
//! publishes the staged content with one same-directory rename. Closing the
//! transaction either discards the backup (commit) or moves it back over the
//! target (rollback). The staging file is always removed and the lock is
//! always released last, including when the transaction is dropped during a
//! panic.
//!
//! [`run`] wraps the whole sequence around a closure: `Ok` commits, `Err`
//! rolls back and returns the closure's error unchanged unless the rollback
//! itself fails.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tempfile::TempPath;
use tracing::{debug, error, info, warn};

use crate::audit::{OperationKind, OperationLog};

use super::SAFETY_TARGET;
use super::error::TransactionError;
use super::lock::FileLock;
use super::paths::{backup_path_for, create_staging, lock_path_for, parent_dir, prepare_publish};

/// Lock timeout used by [`TransactionOptions::default`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// How a transaction acquires its lock and whether it takes a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    timeout: Duration,
    create_backup: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionOptions {
    /// Thirty second timeout with backups enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            create_backup: true,
        }
    }

    /// Sets how long `begin` waits for the lock.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables the pre-mutation backup.
    #[must_use]
    pub const fn with_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }

    /// Lock acquisition timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a backup is taken when the target exists.
    #[must_use]
    pub const fn create_backup(&self) -> bool {
        self.create_backup
    }
}

/// An open, lock-holding mutation of one target file.
#[derive(Debug)]
pub struct FileTransaction {
    target: PathBuf,
    backup_path: PathBuf,
    backup_taken: bool,
    target_existed: bool,
    published: bool,
    staging: Option<TempPath>,
    log: OperationLog,
    lock: Option<FileLock>,
    finished: bool,
}

impl FileTransaction {
    /// Locks `target` and snapshots it when backups are enabled.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::LockTimeout`] or
    /// [`TransactionError::LockAcquisition`] when the lock cannot be taken,
    /// and [`TransactionError::Backup`] when the snapshot fails. In every
    /// error case the lock has already been released and nothing was
    /// modified.
    pub fn begin(
        path: impl AsRef<Path>,
        options: TransactionOptions,
    ) -> Result<Self, TransactionError> {
        let target = path.as_ref().to_path_buf();
        let lock = FileLock::acquire(&lock_path_for(&target), options.timeout())?;

        let target_existed = target.is_file();
        let backup_path = backup_path_for(&target);
        let mut log = OperationLog::new();
        let backup_taken = options.create_backup() && target_existed;
        if backup_taken {
            // `lock` is dropped, and so released, if the snapshot fails.
            snapshot(&target, &backup_path)?;
            info!(
                target: SAFETY_TARGET,
                path = %target.display(),
                backup = %backup_path.display(),
                "created backup"
            );
            log.record(
                OperationKind::BackupCreated,
                &target,
                backup_path.display().to_string(),
            );
        }

        debug!(
            target: SAFETY_TARGET,
            path = %target.display(),
            backup = backup_taken,
            "transaction opened"
        );
        Ok(Self {
            target,
            backup_path,
            backup_taken,
            target_existed,
            published: false,
            staging: None,
            log,
            lock: Some(lock),
            finished: false,
        })
    }

    /// File this transaction mutates.
    #[must_use]
    pub fn target(&self) -> &Path {
        self.target.as_path()
    }

    /// Lock file held by this transaction.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.target)
    }

    /// Backup snapshot, if one was taken.
    #[must_use]
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_taken.then_some(self.backup_path.as_path())
    }

    /// Whether staged content has replaced the target.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        self.published
    }

    /// Steps recorded so far.
    #[must_use]
    pub const fn operation_log(&self) -> &OperationLog {
        &self.log
    }

    /// Private staging path beside the target, created on first call.
    ///
    /// Later calls return the same path. The file is removed when the
    /// transaction closes unless it was published.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Staging`] when the file cannot be created.
    pub fn staging_path(&mut self) -> Result<&Path, TransactionError> {
        let staging = match self.staging.take() {
            Some(staging) => staging,
            None => create_staging(&self.target).map_err(|source| TransactionError::Staging {
                path: self.target.clone(),
                source,
            })?,
        };
        let path: &Path = self.staging.insert(staging);
        Ok(path)
    }

    /// Opens the staging file for writing, truncating earlier content.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Staging`] when the file cannot be created
    /// or opened.
    pub fn open_staging(&mut self) -> Result<File, TransactionError> {
        let target = self.target.clone();
        let path = self.staging_path()?;
        File::create(path).map_err(|source| TransactionError::Staging {
            path: target,
            source,
        })
    }

    /// Replaces the staging file's content with `content`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Staging`] when the write fails.
    pub fn write_staging(&mut self, content: &[u8]) -> Result<(), TransactionError> {
        let target = self.target.clone();
        let path = self.staging_path()?;
        fs::write(path, content).map_err(|source| TransactionError::Staging {
            path: target,
            source,
        })
    }

    /// Atomically renames `source` over the target.
    ///
    /// `source` is normally the staging path, but any file in the target's
    /// directory is accepted. It is synced to disk and given the target's
    /// permissions first. Readers opening the target by path observe either
    /// the old or the new content, never a mix.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::SourceNotFound`] when `source` does not
    /// exist and [`TransactionError::Replace`] when the rename fails.
    pub fn atomic_replace(&mut self, source: &Path) -> Result<(), TransactionError> {
        if !source.exists() {
            return Err(TransactionError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        if let Err(error) = prepare_publish(source, &self.target) {
            return Err(self.replace_error(source, error));
        }

        let own_staging = self
            .staging
            .as_deref()
            .is_some_and(|staging| staging == source);
        if own_staging {
            if let Some(staging) = self.staging.take()
                && let Err(failure) = staging.persist(&self.target)
            {
                self.staging = Some(failure.path);
                return Err(self.replace_error(source, failure.error));
            }
        } else if let Err(failure) = fs::rename(source, &self.target) {
            return Err(self.replace_error(source, failure));
        }

        self.published = true;
        info!(
            target: SAFETY_TARGET,
            path = %self.target.display(),
            source = %source.display(),
            "atomically replaced target"
        );
        self.log.record(
            OperationKind::AtomicReplace,
            &self.target,
            format!("{} -> {}", source.display(), self.target.display()),
        );
        Ok(())
    }

    /// Publishes this transaction's own staging file.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::SourceNotFound`] when no staging file was
    /// ever requested, otherwise the errors of
    /// [`atomic_replace`](Self::atomic_replace).
    pub fn publish(&mut self) -> Result<(), TransactionError> {
        let Some(staging) = self.staging.as_deref().map(Path::to_path_buf) else {
            let name = self
                .target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(TransactionError::SourceNotFound {
                path: parent_dir(&self.target).join(format!(".{name}.*.tmp")),
            });
        };
        self.atomic_replace(&staging)
    }

    /// Closes the transaction successfully and returns its operation log.
    ///
    /// The backup is deleted; failing to delete it is logged but does not
    /// fail the commit, since the published content is already in place.
    #[must_use = "the operation log describes what the transaction did"]
    pub fn commit(mut self) -> OperationLog {
        if let Err(error) = self.finish(None) {
            // Commit never restores, so `finish` has nothing to report here.
            warn!(target: SAFETY_TARGET, error = %error, "unexpected commit error");
        }
        mem::take(&mut self.log)
    }

    /// Closes the transaction, restoring the target to its pre-image.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::RestoreFailed`] or
    /// [`TransactionError::RemoveCreated`] when the pre-image cannot be
    /// restored. The lock is released either way.
    pub fn rollback(self) -> Result<OperationLog, TransactionError> {
        self.abort("rollback requested")
    }

    /// Runs `body` against this transaction, then commits or rolls back.
    ///
    /// `Ok` commits. `Err` rolls back and returns the body's error
    /// unchanged; if the rollback itself fails, the rollback error is
    /// returned instead because it signals possible data loss, and it
    /// carries the body's error message as its cause. A panic in `body`
    /// rolls back while unwinding.
    ///
    /// # Errors
    ///
    /// Returns the body's error or a restore error from the rollback.
    pub fn scoped<T, E, F>(mut self, body: F) -> Result<TransactionReport<T>, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<TransactionError> + fmt::Display,
    {
        match body(&mut self) {
            Ok(value) => {
                let log = self.commit();
                Ok(TransactionReport { value, log })
            }
            Err(error) => {
                warn!(
                    target: SAFETY_TARGET,
                    path = %self.target.display(),
                    error = %error,
                    "operation failed, rolling back"
                );
                match self.abort(&error.to_string()) {
                    Ok(_) => Err(error),
                    Err(restore) => Err(E::from(restore)),
                }
            }
        }
    }

    fn abort(mut self, cause: &str) -> Result<OperationLog, TransactionError> {
        self.finish(Some(cause))?;
        Ok(mem::take(&mut self.log))
    }

    /// Disposes of the backup, removes staging, then releases the lock.
    fn finish(&mut self, failure: Option<&str>) -> Result<(), TransactionError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let outcome = match failure {
            None => {
                self.discard_backup();
                Ok(())
            }
            Some(cause) => self.restore(cause),
        };
        self.discard_staging();
        drop(self.lock.take());
        outcome
    }

    fn discard_backup(&mut self) {
        if !self.backup_taken {
            return;
        }
        match fs::remove_file(&self.backup_path) {
            Ok(()) => {
                info!(
                    target: SAFETY_TARGET,
                    backup = %self.backup_path.display(),
                    "operation successful, removed backup"
                );
                self.log
                    .record(OperationKind::BackupRemoved, &self.target, "success");
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                target: SAFETY_TARGET,
                backup = %self.backup_path.display(),
                error = %error,
                "failed to remove backup after commit"
            ),
        }
    }

    fn restore(&mut self, cause: &str) -> Result<(), TransactionError> {
        if self.backup_taken {
            return match fs::rename(&self.backup_path, &self.target) {
                Ok(()) => {
                    info!(
                        target: SAFETY_TARGET,
                        path = %self.target.display(),
                        backup = %self.backup_path.display(),
                        cause,
                        "restored from backup"
                    );
                    self.log.record(
                        OperationKind::RestoredFromBackup,
                        &self.target,
                        self.backup_path.display().to_string(),
                    );
                    Ok(())
                }
                Err(source) => {
                    error!(
                        target: SAFETY_TARGET,
                        path = %self.target.display(),
                        backup = %self.backup_path.display(),
                        cause,
                        error = %source,
                        "restore from backup failed; target may be inconsistent"
                    );
                    Err(TransactionError::RestoreFailed {
                        target: self.target.clone(),
                        backup: self.backup_path.clone(),
                        cause: cause.to_owned(),
                        source,
                    })
                }
            };
        }

        if !self.published {
            debug!(
                target: SAFETY_TARGET,
                path = %self.target.display(),
                cause,
                "nothing published; target untouched"
            );
            return Ok(());
        }

        if self.target_existed {
            warn!(
                target: SAFETY_TARGET,
                path = %self.target.display(),
                cause,
                "backups disabled; published content cannot be rolled back"
            );
            return Ok(());
        }

        match fs::remove_file(&self.target) {
            Ok(()) => {
                info!(
                    target: SAFETY_TARGET,
                    path = %self.target.display(),
                    cause,
                    "removed target created by the failed transaction"
                );
                self.log
                    .record(OperationKind::CreatedTargetRemoved, &self.target, cause);
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TransactionError::RemoveCreated {
                target: self.target.clone(),
                cause: cause.to_owned(),
                source,
            }),
        }
    }

    fn discard_staging(&mut self) {
        let Some(staging) = self.staging.take() else {
            return;
        };
        let path = staging.to_path_buf();
        match staging.close() {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                target: SAFETY_TARGET,
                staging = %path.display(),
                error = %error,
                "failed to remove staging file"
            ),
        }
    }

    fn replace_error(&self, source: &Path, error: io::Error) -> TransactionError {
        TransactionError::Replace {
            staging: source.to_path_buf(),
            target: self.target.clone(),
            source: error,
        }
    }
}

impl Drop for FileTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let cause = if thread::panicking() {
            "panic inside the transaction"
        } else {
            "transaction dropped without commit"
        };
        if let Err(error) = self.finish(Some(cause)) {
            error!(
                target: SAFETY_TARGET,
                path = %self.target.display(),
                error = %error,
                "rollback during drop failed"
            );
        }
    }
}

/// Value produced by a committed [`run`] together with its operation log.
#[derive(Debug)]
pub struct TransactionReport<T> {
    value: T,
    log: OperationLog,
}

impl<T> TransactionReport<T> {
    /// Value returned by the transaction body.
    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }

    /// Steps the transaction recorded.
    #[must_use]
    pub const fn log(&self) -> &OperationLog {
        &self.log
    }

    /// Discards the log and returns the value.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Splits the report into value and log.
    #[must_use]
    pub fn into_parts(self) -> (T, OperationLog) {
        (self.value, self.log)
    }
}

/// Runs `body` inside a transaction on `target`.
///
/// Equivalent to [`FileTransaction::begin`] followed by
/// [`FileTransaction::scoped`].
///
/// # Errors
///
/// Returns the body's error, a lock or backup error from opening the
/// transaction, or a restore error from the rollback.
///
/// # Examples
///
/// ```rust
/// use partedit::safety::{self, TransactionError, TransactionOptions};
///
/// # fn main() -> Result<(), TransactionError> {
/// let dir = tempfile::tempdir().map_err(|source| TransactionError::Staging {
///     path: "demo".into(),
///     source,
/// })?;
/// let target = dir.path().join("greeting.txt");
/// std::fs::write(&target, "hello").ok();
///
/// safety::run(&target, TransactionOptions::new(), |txn| {
///     txn.write_staging(b"goodbye")?;
///     txn.publish()
/// })?;
/// assert_eq!(std::fs::read_to_string(&target).ok().as_deref(), Some("goodbye"));
/// # Ok(())
/// # }
/// ```
pub fn run<T, E, F>(
    target: impl AsRef<Path>,
    options: TransactionOptions,
    body: F,
) -> Result<TransactionReport<T>, E>
where
    F: FnOnce(&mut FileTransaction) -> Result<T, E>,
    E: From<TransactionError> + fmt::Display,
{
    FileTransaction::begin(target, options)?.scoped(body)
}

fn snapshot(target: &Path, backup: &Path) -> Result<(), TransactionError> {
    if let Err(source) = fs::copy(target, backup) {
        error!(
            target: SAFETY_TARGET,
            path = %target.display(),
            backup = %backup.display(),
            error = %source,
            "failed to create backup"
        );
        // A partial copy must not be mistaken for a valid snapshot.
        if let Err(cleanup) = fs::remove_file(backup)
            && cleanup.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: SAFETY_TARGET,
                backup = %backup.display(),
                error = %cleanup,
                "failed to remove partial backup"
            );
        }
        return Err(TransactionError::Backup {
            path: target.to_path_buf(),
            backup: backup.to_path_buf(),
            source,
        });
    }
    Ok(())
}
