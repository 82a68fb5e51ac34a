//! Random access to the lines of a text file.
//!
//! [`LineIndex::build`] scans the file once and records the byte offset at
//! which each line starts. Reads then seek straight to the line. Structural
//! mutations rewrite the file through a staging file in the same directory,
//! rename it over the original, and rebuild the whole index, so a mutation
//! costs O(file size) while reads stay O(1).
//!
//! The index is a snapshot. Changes made to the file by anything other than
//! this index are not noticed until [`LineIndex::build`] is called again.

mod error;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::debug;

pub use error::LineIndexError;

use crate::safety::{create_staging, prepare_publish};
use crate::splice::{copy_spliced, terminated};

const INDEX_TARGET: &str = "partedit::line_index";

/// Byte offsets of every line in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    path: PathBuf,
    offsets: Vec<u64>,
    len: u64,
    terminated: bool,
}

impl LineIndex {
    /// Scans `path` and records where each line starts.
    ///
    /// A zero-byte file has no lines. Trailing content without a final
    /// newline counts as one line.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::NotFound`] if the file does not exist, or
    /// [`LineIndexError::Io`] if it cannot be read.
    pub fn build(target: impl AsRef<Path>) -> Result<Self, LineIndexError> {
        let path = target.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|error| LineIndexError::io(&path, error))?;
        let mut reader = BufReader::new(file);

        // Only line lengths are needed, so no line is ever held in memory.
        let mut offsets = Vec::new();
        let mut position = 0_u64;
        loop {
            let read = reader
                .skip_until(b'\n')
                .map_err(|error| LineIndexError::io(&path, error))?;
            if read == 0 {
                break;
            }
            offsets.push(position);
            position += read as u64;
        }
        let terminated = ends_with_newline(reader.get_mut(), position)
            .map_err(|error| LineIndexError::io(&path, error))?;

        debug!(
            target: INDEX_TARGET,
            path = %path.display(),
            lines = offsets.len(),
            bytes = position,
            "built line index"
        );
        Ok(Self {
            path,
            offsets,
            len: position,
            terminated,
        })
    }

    /// File this index describes.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }

    /// Start offset of every line, strictly increasing.
    #[must_use]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Bytes occupied by line `line`, including its terminator.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::OutOfRange`] for a missing line.
    pub fn byte_range(&self, line: usize) -> Result<Range<u64>, LineIndexError> {
        let start = *self.offsets.get(line).ok_or(LineIndexError::OutOfRange {
            line,
            line_count: self.line_count(),
        })?;
        let end = self.offsets.get(line + 1).copied().unwrap_or(self.len);
        Ok(start..end)
    }

    /// Bytes covered by lines `start..end`; `end` may equal `line_count`.
    pub(crate) fn span(&self, start: usize, end: usize) -> Result<Range<u64>, LineIndexError> {
        let line_count = self.line_count();
        if start > end || end > line_count {
            return Err(LineIndexError::OutOfRange {
                line: if start > line_count { start } else { end },
                line_count,
            });
        }
        let offset_of = |line: usize| self.offsets.get(line).copied().unwrap_or(self.len);
        Ok(offset_of(start)..offset_of(end))
    }

    /// Line `line` (0-based) without its terminator.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::OutOfRange`] for a missing line, or an IO
    /// error if the file cannot be read.
    pub fn get_line(&self, line: usize) -> Result<String, LineIndexError> {
        let range = self.byte_range(line)?;
        let mut file =
            File::open(&self.path).map_err(|error| LineIndexError::io(&self.path, error))?;
        read_range(&mut file, range).map_err(|error| LineIndexError::io(&self.path, error))
    }

    /// Lines `start..end`, clipped to the lines that exist.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn get_lines(&self, start: usize, end: usize) -> Result<Vec<String>, LineIndexError> {
        self.iter_lines(start, Some(end))
            .collect::<io::Result<Vec<_>>>()
            .map_err(|error| LineIndexError::io(&self.path, error))
    }

    /// Lazily yields lines `start..end` (to the last line when `end` is
    /// `None`), clipped like [`get_lines`](Self::get_lines).
    ///
    /// The file is opened on the first call to `next`. Calling this again
    /// starts a fresh, independent iteration.
    #[must_use]
    pub fn iter_lines(&self, start: usize, end: Option<usize>) -> Lines<'_> {
        let line_count = self.line_count();
        let end = end.map_or(line_count, |end| end.min(line_count));
        Lines {
            index: self,
            next: start.min(end),
            end,
            file: None,
        }
    }

    /// Replaces line `line` and rebuilds the index.
    ///
    /// A newline is appended to `content` unless it already ends with one.
    /// Content containing further newlines becomes several lines.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::OutOfRange`] for a missing line, or an IO
    /// error if the file cannot be rewritten. The file is unchanged on error.
    pub fn replace_line(&mut self, line: usize, content: &str) -> Result<(), LineIndexError> {
        self.byte_range(line)?;
        self.replace_lines(line, line + 1, &[content])
    }

    /// Replaces lines `start..end` with `lines` and rebuilds the index.
    ///
    /// `start == end` inserts before `start`.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::OutOfRange`] when the range is inverted or
    /// reaches past the last line.
    pub fn replace_lines<S: AsRef<str>>(
        &mut self,
        start: usize,
        end: usize,
        lines: &[S],
    ) -> Result<(), LineIndexError> {
        let (range, replacement) = self.line_splice(start, end, lines)?;
        if replacement.is_empty() && range.is_empty() {
            return Ok(());
        }
        self.rewrite(range, &replacement)
    }

    /// Byte range and encoded bytes that replace lines `start..end` with
    /// `lines`.
    ///
    /// Each new line is terminated with `\n`, except that a missing final
    /// newline stays missing when the last line is replaced. Appending after
    /// an unterminated last line first terminates it.
    pub(crate) fn line_splice<S: AsRef<str>>(
        &self,
        start: usize,
        end: usize,
        lines: &[S],
    ) -> Result<(Range<u64>, Vec<u8>), LineIndexError> {
        let range = self.span(start, end)?;
        let mut replacement = Vec::new();
        if range.start == self.len && !self.terminated && !lines.is_empty() {
            replacement.push(b'\n');
        }
        for line in lines {
            replacement.extend(terminated(line.as_ref()));
        }
        if range.end == self.len
            && !self.terminated
            && start < end
            && replacement.last() == Some(&b'\n')
        {
            replacement.pop();
        }
        Ok((range, replacement))
    }

    /// Inserts `content` so that it becomes line `line`; `line` may equal
    /// `line_count` to append.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::OutOfRange`] when `line > line_count`.
    pub fn insert_line(&mut self, line: usize, content: &str) -> Result<(), LineIndexError> {
        self.replace_lines(line, line, &[content])
    }

    /// Removes line `line` and rebuilds the index.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::OutOfRange`] for a missing line.
    pub fn delete_line(&mut self, line: usize) -> Result<(), LineIndexError> {
        let range = self.byte_range(line)?;
        self.rewrite(range, &[])
    }

    fn rewrite(&mut self, range: Range<u64>, replacement: &[u8]) -> Result<(), LineIndexError> {
        let staging =
            create_staging(&self.path).map_err(|error| LineIndexError::io(&self.path, error))?;
        let stage = || -> io::Result<()> {
            let mut file = File::create(&staging)?;
            copy_spliced(&self.path, range.clone(), replacement, &mut file)?;
            file.flush()?;
            drop(file);
            prepare_publish(&staging, &self.path)
        };
        stage().map_err(|error| LineIndexError::io(&self.path, error))?;
        staging
            .persist(&self.path)
            .map_err(|failure| LineIndexError::io(&self.path, failure.error))?;

        debug!(
            target: INDEX_TARGET,
            path = %self.path.display(),
            start = range.start,
            end = range.end,
            written = replacement.len(),
            "rewrote indexed file"
        );
        *self = Self::build(&self.path)?;
        Ok(())
    }
}

/// Lazy iterator over a range of indexed lines.
#[derive(Debug)]
pub struct Lines<'a> {
    index: &'a LineIndex,
    next: usize,
    end: usize,
    file: Option<File>,
}

impl Iterator for Lines<'_> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let line = self.next;
        self.next += 1;

        let Ok(range) = self.index.byte_range(line) else {
            return None;
        };
        if self.file.is_none() {
            match File::open(self.index.path()) {
                Ok(opened) => self.file = Some(opened),
                Err(error) => {
                    self.next = self.end;
                    return Some(Err(error));
                }
            }
        }
        self.file.as_mut().map(|file| read_range(file, range))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

fn read_range(file: &mut File, range: Range<u64>) -> io::Result<String> {
    file.seek(SeekFrom::Start(range.start))?;
    let len = usize::try_from(range.end - range.start)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "line too long to load"))?;
    let mut bytes = vec![0_u8; len];
    file.read_exact(&mut bytes)?;
    Ok(decode_line(&bytes))
}

/// Whether the last of `len` bytes in `file` is `\n`; vacuously true when
/// the file is empty.
fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    let Some(last) = len.checked_sub(1) else {
        return Ok(true);
    };
    file.seek(SeekFrom::Start(last))?;
    let mut byte = [0_u8; 1];
    file.read_exact(&mut byte)?;
    Ok(byte == [b'\n'])
}

/// Decodes a raw line, dropping `\n` and one `\r` before it.
pub(crate) fn decode_line(raw: &[u8]) -> String {
    let without_lf = raw.strip_suffix(b"\n").unwrap_or(raw);
    let content = without_lf.strip_suffix(b"\r").unwrap_or(without_lf);
    String::from_utf8_lossy(content).into_owned()
}

#[cfg(test)]
mod tests;
