//! Cross-process advisory lock keyed on a target path.
//!
//! The lock is an exclusive `flock` on `<target>.lock`, so it excludes both
//! other threads (each acquisition opens its own file description) and other
//! processes. Acquisition polls a non-blocking lock until the timeout
//! elapses. The lock file itself is left on disk after release: deleting it
//! while a waiter holds an open handle would let two holders lock different
//! inodes under the same name.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, info, warn};

use super::SAFETY_TARGET;
use super::error::TransactionError;

/// Delay between attempts while another holder owns the lock.
pub(crate) const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// An acquired exclusive lock, released on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Acquires the lock at `path`, waiting up to `timeout`.
    ///
    /// A zero timeout makes exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::LockTimeout`] when the lock stays held by
    /// someone else for the whole timeout, or
    /// [`TransactionError::LockAcquisition`] when the lock file cannot be
    /// opened or locked for any other reason.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, TransactionError> {
        let file = open_lock_file(path)?;
        let started = Instant::now();
        // `None` means the timeout is too large to represent: wait forever.
        let deadline = started.checked_add(timeout);

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    info!(
                        target: SAFETY_TARGET,
                        lock = %path.display(),
                        waited_ms = started.elapsed().as_millis(),
                        "acquired file lock"
                    );
                    return Ok(Self {
                        path: path.to_path_buf(),
                        file,
                    });
                }
                Err(error) if is_contended(&error) => {
                    let now = Instant::now();
                    let pause = match deadline {
                        Some(deadline) if now >= deadline => {
                            warn!(
                                target: SAFETY_TARGET,
                                lock = %path.display(),
                                timeout_ms = timeout.as_millis(),
                                "timed out waiting for file lock"
                            );
                            return Err(TransactionError::LockTimeout {
                                lock: path.to_path_buf(),
                                timeout,
                            });
                        }
                        Some(deadline) => LOCK_POLL_INTERVAL.min(deadline - now),
                        None => LOCK_POLL_INTERVAL,
                    };
                    thread::sleep(pause);
                }
                Err(source) => {
                    return Err(TransactionError::LockAcquisition {
                        lock: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => debug!(
                target: SAFETY_TARGET,
                lock = %self.path.display(),
                "released file lock"
            ),
            // Closing the handle below still drops the lock.
            Err(error) => warn!(
                target: SAFETY_TARGET,
                lock = %self.path.display(),
                error = %error,
                "explicit unlock failed"
            ),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, TransactionError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options
        .open(path)
        .map_err(|source| TransactionError::LockAcquisition {
            lock: path.to_path_buf(),
            source,
        })
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn second_acquisition_times_out_while_held() {
        let dir = TempDir::new().expect("create temp dir");
        let lock_path = dir.path().join("data.txt.lock");
        let held = FileLock::acquire(&lock_path, Duration::ZERO).expect("first lock");

        let started = Instant::now();
        let error = FileLock::acquire(&lock_path, Duration::from_millis(100))
            .expect_err("second lock should time out");
        assert!(matches!(error, TransactionError::LockTimeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(100));
        drop(held);
    }

    #[test]
    fn lock_is_reacquirable_after_drop() {
        let dir = TempDir::new().expect("create temp dir");
        let lock_path = dir.path().join("data.txt.lock");
        drop(FileLock::acquire(&lock_path, Duration::ZERO).expect("first lock"));

        let again = FileLock::acquire(&lock_path, Duration::ZERO).expect("second lock");
        assert_eq!(again.path(), lock_path.as_path());
        assert!(lock_path.exists(), "lock file stays on disk");
    }

    #[test]
    fn waiter_acquires_once_holder_releases() {
        let dir = TempDir::new().expect("create temp dir");
        let lock_path = dir.path().join("data.txt.lock");
        let held = FileLock::acquire(&lock_path, Duration::ZERO).expect("first lock");

        let (sender, receiver) = mpsc::channel();
        let waiter_path = lock_path.clone();
        let waiter = thread::spawn(move || {
            let result = FileLock::acquire(&waiter_path, Duration::from_secs(5));
            sender.send(result.is_ok()).expect("send result");
        });

        thread::sleep(Duration::from_millis(100));
        drop(held);
        assert!(receiver.recv().expect("receive result"));
        waiter.join().expect("waiter thread");
    }

    #[test]
    fn missing_directory_is_an_acquisition_error() {
        let dir = TempDir::new().expect("create temp dir");
        let lock_path = dir.path().join("missing").join("data.txt.lock");
        let error = FileLock::acquire(&lock_path, Duration::ZERO).expect_err("should fail");
        assert!(matches!(error, TransactionError::LockAcquisition { .. }));
    }
}
