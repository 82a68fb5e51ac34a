//! Byte search and same-length replacement through a memory map.
//!
//! [`MappedFile`] maps a whole file and searches it in place, without
//! reading it onto the heap. Writes land directly in the mapping, so only
//! edits that keep every byte offset where it was are offered: overwriting
//! a slice and replacing a pattern with one of equal length. Edits that
//! change the length belong in a [`FileTransaction`](crate::FileTransaction),
//! and [`FileEditor::find_replace`](crate::FileEditor::find_replace) runs
//! this module against a staging copy for an atomic result.
//!
//! A zero-byte file has no mapping and reads as an empty slice.

mod error;

use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Bound, Range, RangeBounds};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};
use tracing::{debug, info};

pub use error::MappedError;

const MAPPED_TARGET: &str = "partedit::mapped";

#[derive(Debug)]
enum Mapping {
    Read(Mmap),
    Write(MmapMut),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Read(map) => map.as_ref(),
            Self::Write(map) => map.as_ref(),
        }
    }
}

/// A file mapped into memory for searching and in-place byte edits.
///
/// Offsets are absolute byte positions in the file. Search ranges are
/// clipped to the mapped length, so `..` always means the whole file.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    file: File,
    writable: bool,
    map: Option<Mapping>,
}

impl MappedFile {
    /// Maps `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns [`MappedError::NotFound`] when the file is missing and
    /// [`MappedError::Io`] when it cannot be opened or mapped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MappedError> {
        Self::with_access(path.as_ref(), false)
    }

    /// Maps `path` for reading and in-place writing.
    ///
    /// # Errors
    ///
    /// As for [`open`](Self::open), plus a permission failure when the file
    /// cannot be opened for writing.
    pub fn open_writable(path: impl AsRef<Path>) -> Result<Self, MappedError> {
        Self::with_access(path.as_ref(), true)
    }

    fn with_access(target: &Path, writable: bool) -> Result<Self, MappedError> {
        let path = target.to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)
            .map_err(|error| MappedError::io(&path, error))?;
        let map = map_file(&file, writable).map_err(|error| MappedError::io(&path, error))?;
        debug!(
            target: MAPPED_TARGET,
            path = %path.display(),
            writable,
            bytes = map.as_ref().map_or(0, |mapping| mapping.bytes().len()),
            "mapped file"
        );
        Ok(Self {
            path,
            file,
            writable,
            map,
        })
    }

    /// Mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Whether the mapping accepts writes.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Mapped length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    /// Whether the file is empty and so has no mapping.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.map.is_none()
    }

    /// The whole mapping.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_ref().map_or(&[] as &[u8], Mapping::bytes)
    }

    /// Bytes within `range`, clipped to the mapped length.
    #[must_use]
    pub fn read_slice(&self, range: impl RangeBounds<u64>) -> &[u8] {
        let window = self.window(&range);
        self.as_bytes().get(window).unwrap_or_default()
    }

    /// Overwrites `data.len()` bytes at `offset`. Returns the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`MappedError::ReadOnly`] for a read-only mapping and
    /// [`MappedError::OutOfBounds`] when the write would pass the end of the
    /// file. Nothing is written on error.
    pub fn write_slice(&mut self, offset: u64, data: &[u8]) -> Result<usize, MappedError> {
        self.check_writable()?;
        let size = self.len();
        let out_of_bounds = || MappedError::OutOfBounds {
            path: self.path.clone(),
            offset,
            len: data.len(),
            size,
        };
        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(data.len()).ok_or_else(out_of_bounds)?;
        let slot = match self.map.as_mut() {
            Some(Mapping::Write(map)) => map.get_mut(start..end),
            _ => None,
        }
        .ok_or_else(out_of_bounds)?;
        slot.copy_from_slice(data);
        Ok(data.len())
    }

    /// Offset of the first `pattern` lying wholly within `range`.
    ///
    /// An empty pattern matches nothing.
    #[must_use]
    pub fn find(&self, pattern: &[u8], range: impl RangeBounds<u64>) -> Option<u64> {
        let window = self.window(&range);
        let base = window.start;
        let haystack = self.as_bytes().get(window)?;
        position_of(haystack, pattern).map(|at| (base + at) as u64)
    }

    /// Offsets of every non-overlapping `pattern` within `range`, in order.
    ///
    /// Scanning resumes after the end of each match, so `aa` occurs twice
    /// in `aaaa`, not three times.
    #[must_use]
    pub fn find_all(&self, pattern: &[u8], range: impl RangeBounds<u64>) -> Vec<u64> {
        let window = self.window(&range);
        let base = window.start;
        let Some(haystack) = self.as_bytes().get(window) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut cursor = 0;
        while let Some(at) = haystack
            .get(cursor..)
            .and_then(|rest| position_of(rest, pattern))
        {
            found.push((base + cursor + at) as u64);
            cursor += at + pattern.len();
        }
        found
    }

    /// Replaces the first `old` within `range` with `new`. Returns the
    /// offset replaced, or `None` when `old` does not occur.
    ///
    /// # Errors
    ///
    /// Returns [`MappedError::ReadOnly`] for a read-only mapping and
    /// [`MappedError::LengthMismatch`] when the patterns differ in length.
    pub fn replace(
        &mut self,
        old: &[u8],
        new: &[u8],
        range: impl RangeBounds<u64>,
    ) -> Result<Option<u64>, MappedError> {
        self.check_writable()?;
        check_lengths(old, new)?;
        let Some(offset) = self.find(old, range) else {
            return Ok(None);
        };
        self.write_slice(offset, new)?;
        Ok(Some(offset))
    }

    /// Replaces every non-overlapping `old` within `range` with `new`.
    /// Returns the number of replacements.
    ///
    /// # Errors
    ///
    /// As for [`replace`](Self::replace).
    pub fn replace_all(
        &mut self,
        old: &[u8],
        new: &[u8],
        range: impl RangeBounds<u64>,
    ) -> Result<usize, MappedError> {
        self.check_writable()?;
        check_lengths(old, new)?;
        let offsets = self.find_all(old, range);
        for &offset in &offsets {
            self.write_slice(offset, new)?;
        }
        debug!(
            target: MAPPED_TARGET,
            path = %self.path.display(),
            replaced = offsets.len(),
            "replaced pattern in mapping"
        );
        Ok(offsets.len())
    }

    /// Truncates or zero-extends the file to `len` bytes and remaps it.
    ///
    /// # Errors
    ///
    /// Returns [`MappedError::ReadOnly`] for a read-only mapping, or an IO
    /// error when flushing, resizing, or remapping fails.
    pub fn resize(&mut self, len: u64) -> Result<(), MappedError> {
        self.check_writable()?;
        self.flush()?;
        // The old mapping must be gone before the file shrinks under it.
        self.map = None;
        self.file
            .set_len(len)
            .map_err(|error| MappedError::io(&self.path, error))?;
        self.map =
            map_file(&self.file, true).map_err(|error| MappedError::io(&self.path, error))?;
        debug!(
            target: MAPPED_TARGET,
            path = %self.path.display(),
            bytes = len,
            "resized mapping"
        );
        Ok(())
    }

    /// Writes modified pages back to the file.
    ///
    /// # Errors
    ///
    /// Returns [`MappedError::Io`] when the flush fails.
    pub fn flush(&self) -> Result<(), MappedError> {
        if let Some(Mapping::Write(map)) = &self.map {
            map.flush().map_err(|error| MappedError::io(&self.path, error))?;
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), MappedError> {
        if self.writable {
            Ok(())
        } else {
            Err(MappedError::ReadOnly {
                path: self.path.clone(),
            })
        }
    }

    fn window(&self, range: &impl RangeBounds<u64>) -> Range<usize> {
        let len = self.as_bytes().len();
        let clip = |bound: u64| usize::try_from(bound).map_or(len, |index| index.min(len));
        let start = match range.start_bound() {
            Bound::Included(&first) => clip(first),
            Bound::Excluded(&before) => clip(before.saturating_add(1)),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&last) => clip(last.saturating_add(1)),
            Bound::Excluded(&after) => clip(after),
            Bound::Unbounded => len,
        };
        start..end.max(start)
    }
}

/// Replaces every `old` in `path` with the same-length `new` in place and
/// flushes the result. Returns the number of replacements.
///
/// The file is edited directly, with no lock or backup. A crash part way
/// through can leave some occurrences replaced and others not; use
/// [`FileEditor::find_replace`](crate::FileEditor::find_replace) when the
/// edit must be atomic.
///
/// # Errors
///
/// Returns [`MappedError::LengthMismatch`] before touching the file when
/// the patterns differ in length, otherwise the errors of
/// [`MappedFile::open_writable`] and [`MappedFile::flush`].
pub fn find_replace(path: impl AsRef<Path>, old: &[u8], new: &[u8]) -> Result<usize, MappedError> {
    check_lengths(old, new)?;
    let mut mapped = MappedFile::open_writable(path)?;
    let replaced = mapped.replace_all(old, new, ..)?;
    mapped.flush()?;
    info!(
        target: MAPPED_TARGET,
        path = %mapped.path().display(),
        replaced,
        "replaced pattern in place"
    );
    Ok(replaced)
}

/// Overwrites bytes at `offset` in `path` in place and flushes the result.
///
/// # Errors
///
/// Returns [`MappedError::OutOfBounds`] when `data` would pass the end of
/// the file, otherwise the errors of [`MappedFile::open_writable`].
pub fn write_at(path: impl AsRef<Path>, offset: u64, data: &[u8]) -> Result<usize, MappedError> {
    let mut mapped = MappedFile::open_writable(path)?;
    let written = mapped.write_slice(offset, data)?;
    mapped.flush()?;
    Ok(written)
}

fn map_file(file: &File, writable: bool) -> io::Result<Option<Mapping>> {
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let mapping = if writable {
        // Safety: the file is open for writing and outlives the mapping.
        Mapping::Write(unsafe { MmapMut::map_mut(file)? })
    } else {
        // Safety: read-only mapping over the file's current bytes.
        Mapping::Read(unsafe { Mmap::map(file)? })
    };
    Ok(Some(mapping))
}

const fn check_lengths(old: &[u8], new: &[u8]) -> Result<(), MappedError> {
    if old.len() == new.len() {
        Ok(())
    } else {
        Err(MappedError::LengthMismatch {
            old: old.len(),
            new: new.len(),
        })
    }
}

fn position_of(haystack: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() {
        return None;
    }
    haystack
        .windows(pattern.len())
        .position(|candidate| candidate == pattern)
}
