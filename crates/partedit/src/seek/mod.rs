//! Byte-addressed editing through a single file handle.
//!
//! [`SeekEditor`] reads and writes at arbitrary offsets, and can insert or
//! delete bytes by shifting the tail of the file in fixed-size blocks, so
//! memory use does not depend on the file size. Edits are applied in place;
//! wrap them in a [`FileTransaction`](crate::safety::FileTransaction) (for
//! example by editing its staging file) when atomicity matters.

mod error;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

pub use error::SeekError;

/// Block size used when shifting file content.
const SHIFT_BLOCK: u64 = 64 * 1024;

/// Random-access editor over one open file.
#[derive(Debug)]
pub struct SeekEditor {
    path: PathBuf,
    file: File,
    writable: bool,
}

impl SeekEditor {
    /// Opens `path` for reading only.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SeekError> {
        Self::open_with(path.as_ref(), false)
    }

    /// Opens an existing file at `path` for reading and writing.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Io`] if the file cannot be opened.
    pub fn open_writable(path: impl AsRef<Path>) -> Result<Self, SeekError> {
        Self::open_with(path.as_ref(), true)
    }

    fn open_with(path: &Path, writable: bool) -> Result<Self, SeekError> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|source| SeekError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            writable,
        })
    }

    /// File being edited.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Current file size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Io`] if the metadata cannot be read.
    pub fn size(&self) -> Result<u64, SeekError> {
        self.file
            .metadata()
            .map(|metadata| metadata.len())
            .map_err(|source| self.io_error(source))
    }

    /// Reads up to `len` bytes starting at `offset`; fewer near the end.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Io`] if seeking or reading fails.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, SeekError> {
        let mut buffer = Vec::with_capacity(len.min(usize::try_from(SHIFT_BLOCK).unwrap_or(len)));
        let limit = u64::try_from(len).unwrap_or(u64::MAX);
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| (&mut self.file).take(limit).read_to_end(&mut buffer))
            .map_err(|source| self.io_error(source))?;
        Ok(buffer)
    }

    /// Overwrites bytes at `offset` and returns how many were written.
    ///
    /// Writing past the end extends the file; any gap reads as zeros.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::ReadOnly`] for a read-only editor, or
    /// [`SeekError::Io`] if the write fails.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize, SeekError> {
        self.ensure_writable()?;
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(data))
            .map_err(|source| self.io_error(source))?;
        Ok(data.len())
    }

    /// Sets the file length, discarding or zero-filling the tail.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::ReadOnly`] for a read-only editor, or
    /// [`SeekError::Io`] if the resize fails.
    pub fn truncate(&mut self, len: u64) -> Result<(), SeekError> {
        self.ensure_writable()?;
        self.file.set_len(len).map_err(|source| self.io_error(source))
    }

    /// Inserts `data` at `offset`, moving everything after it to the right.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::InvalidRange`] when `offset` is past the end,
    /// [`SeekError::ReadOnly`] for a read-only editor, or [`SeekError::Io`].
    pub fn insert_at(&mut self, offset: u64, data: &[u8]) -> Result<(), SeekError> {
        self.ensure_writable()?;
        let size = self.size()?;
        if offset > size {
            return Err(SeekError::InvalidRange {
                start: offset,
                end: offset,
                size,
            });
        }
        let shift = u64::try_from(data.len()).unwrap_or(u64::MAX);
        if shift == 0 {
            return Ok(());
        }

        // Walk backwards so no block is overwritten before it has moved.
        let mut end = size;
        while end > offset {
            let start = end.saturating_sub(SHIFT_BLOCK).max(offset);
            self.move_block(start..end, start + shift)?;
            end = start;
        }
        self.write_at(offset, data)?;
        Ok(())
    }

    /// Removes bytes `start..end`, moving the tail left and shrinking the
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::InvalidRange`] when `start > end` or
    /// `end > size`, [`SeekError::ReadOnly`] for a read-only editor, or
    /// [`SeekError::Io`].
    pub fn delete_range(&mut self, start: u64, end: u64) -> Result<(), SeekError> {
        self.ensure_writable()?;
        let size = self.size()?;
        if start > end || end > size {
            return Err(SeekError::InvalidRange { start, end, size });
        }
        let removed = end - start;
        if removed == 0 {
            return Ok(());
        }

        let mut from = end;
        while from < size {
            let block_end = from.saturating_add(SHIFT_BLOCK).min(size);
            self.move_block(from..block_end, from - removed)?;
            from = block_end;
        }
        self.truncate(size - removed)
    }

    /// Ranges of the file that contain at least one non-zero byte.
    ///
    /// The file is sampled in `sample_size` blocks; consecutive blocks with
    /// data are merged. A region still open at the end of the file closes
    /// at the file size.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Io`] if the file cannot be read.
    pub fn find_data_regions(&mut self, sample_size: usize) -> Result<Vec<Range<u64>>, SeekError> {
        let size = self.size()?;
        let mut regions = Vec::new();
        let mut region_start: Option<u64> = None;
        let mut offset = 0_u64;

        while offset < size {
            let block = self.read_at(offset, sample_size.max(1))?;
            if block.is_empty() {
                break;
            }
            let has_data = block.iter().any(|byte| *byte != 0);
            match (has_data, region_start) {
                (true, None) => region_start = Some(offset),
                (false, Some(start)) => {
                    regions.push(start..offset);
                    region_start = None;
                }
                _ => {}
            }
            offset += u64::try_from(block.len()).unwrap_or(u64::MAX);
        }

        if let Some(start) = region_start {
            regions.push(start..size);
        }
        Ok(regions)
    }

    /// Flushes buffered writes and file metadata to disk.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Io`] if syncing fails.
    pub fn sync(&mut self) -> Result<(), SeekError> {
        self.file
            .flush()
            .and_then(|()| self.file.sync_all())
            .map_err(|source| self.io_error(source))
    }

    fn move_block(&mut self, range: Range<u64>, to: u64) -> Result<(), SeekError> {
        let len = usize::try_from(range.end - range.start).unwrap_or(usize::MAX);
        let block = self.read_at(range.start, len)?;
        self.write_at(to, &block)?;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), SeekError> {
        if self.writable {
            Ok(())
        } else {
            Err(SeekError::ReadOnly {
                path: self.path.clone(),
            })
        }
    }

    fn io_error(&self, source: io::Error) -> SeekError {
        SeekError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
