//! Filesystem naming conventions shared with collaborating tools.
//!
//! - lock: `<target>.lock`
//! - backup: `<target>.backup.<token>`, the token unique per transaction
//! - staging: `.<file name>.<random>.tmp` in the target's directory

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempPath;

static BACKUP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Lock file guarding `target`.
#[must_use]
pub fn lock_path_for(target: &Path) -> PathBuf {
    with_suffix(target, ".lock")
}

/// Fresh backup path for `target`.
///
/// The token combines the wall-clock time in nanoseconds with a process-wide
/// sequence number, so sequential transactions on one path never collide.
#[must_use]
pub fn backup_path_for(target: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let sequence = BACKUP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    with_suffix(target, &format!(".backup.{nanos}-{sequence}"))
}

/// Directory that holds `target`; `.` for bare file names.
#[must_use]
pub fn parent_dir(target: &Path) -> &Path {
    target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Creates an empty hidden staging file beside `target`.
///
/// The returned [`TempPath`] deletes the file when dropped unless it has been
/// persisted over the target first.
pub(crate) fn create_staging(target: &Path) -> io::Result<TempPath> {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = format!(".{name}.");
    let staging = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent_dir(target))?;
    Ok(staging.into_temp_path())
}

/// Flushes `staging` to disk and copies `target`'s permissions onto it.
///
/// Called immediately before `staging` is renamed over `target`, so the
/// rename changes the content but keeps the mode. A missing target leaves
/// the staging file's own permissions in place.
pub(crate) fn prepare_publish(staging: &Path, target: &Path) -> io::Result<()> {
    // Sync before copying permissions: a read-only mode would block the open.
    OpenOptions::new().write(true).open(staging)?.sync_all()?;
    match target.metadata() {
        Ok(metadata) => fs::set_permissions(staging, metadata.permissions()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = target.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}
