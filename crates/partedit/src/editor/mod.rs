//! Collaborator-facing editing facade.
//!
//! [`FileEditor`] bundles the transaction, line index, and streaming
//! primitives behind a handful of whole operations. Every mutation runs in
//! its own [`FileTransaction`]: the lock is retried while contended, the new
//! content is written to the staging file, and the result is published with
//! one atomic rename. Each call is timed by the shared
//! [`PerformanceMonitor`] and appended to the editor's [`OperationLog`],
//! whether it succeeds or fails.

mod error;
mod options;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use partedit_config::Config;
use tracing::{debug, info, warn};

pub use error::EditorError;
pub use options::EditorOptions;

use crate::audit::{OperationKind, OperationLog};
use crate::line_index::LineIndex;
use crate::mapped::MappedFile;
use crate::monitor::PerformanceMonitor;
use crate::safety::{FileTransaction, TransactionError};
use crate::splice::copy_spliced;
use crate::stream::StreamEditor;

const EDITOR_TARGET: &str = "partedit::editor";

/// Guarded, audited, and timed file operations.
#[derive(Debug)]
pub struct FileEditor {
    options: EditorOptions,
    monitor: Arc<PerformanceMonitor>,
    log: Mutex<OperationLog>,
}

impl Default for FileEditor {
    fn default() -> Self {
        Self::new(EditorOptions::default())
    }
}

impl FileEditor {
    /// Creates an editor with its own performance monitor.
    #[must_use]
    pub fn new(options: EditorOptions) -> Self {
        Self::with_monitor(options, Arc::new(PerformanceMonitor::new()))
    }

    /// Creates an editor that reports timings to `monitor`.
    #[must_use]
    pub fn with_monitor(options: EditorOptions, monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            options,
            monitor,
            log: Mutex::new(OperationLog::new()),
        }
    }

    /// Creates an editor configured from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(EditorOptions::from_config(config))
    }

    /// Options applied to every operation.
    #[must_use]
    pub const fn options(&self) -> &EditorOptions {
        &self.options
    }

    /// Monitor receiving per-operation timings.
    #[must_use]
    pub const fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Snapshot of every record appended so far.
    #[must_use]
    pub fn operation_log(&self) -> OperationLog {
        self.records().clone()
    }

    /// Opens a transaction on `path`, retrying while the lock is contended.
    ///
    /// # Errors
    ///
    /// Returns the last [`TransactionError::LockTimeout`] once retries are
    /// exhausted, or any non-transient transaction error immediately.
    pub fn begin(&self, path: impl AsRef<Path>) -> Result<FileTransaction, EditorError> {
        let target = path.as_ref();
        self.options
            .retry()
            .execute(
                || FileTransaction::begin(target, self.options.transaction()),
                TransactionError::is_transient,
            )
            .map_err(EditorError::from)
    }

    /// Rewrites `path` by streaming its current content through `edit`.
    ///
    /// `edit` reads the old content (empty when the file does not exist yet)
    /// and writes the complete new content. Any error from `edit` rolls the
    /// file back.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Io`] when `edit` fails, plus the errors of
    /// [`begin`](Self::begin) and of publishing.
    pub fn safe_edit<T, F>(&self, path: impl AsRef<Path>, edit: F) -> Result<T, EditorError>
    where
        F: FnOnce(&mut dyn BufRead, &mut dyn Write) -> io::Result<T>,
    {
        let target = path.as_ref();
        self.guarded(OperationKind::SafeEdit, target, |txn| {
            let mut reader: Box<dyn BufRead> = if target.exists() {
                let file = File::open(target).map_err(|source| EditorError::io(target, source))?;
                Box::new(BufReader::with_capacity(self.options.chunk_size(), file))
            } else {
                Box::new(io::empty())
            };
            let mut writer =
                BufWriter::with_capacity(self.options.chunk_size(), txn.open_staging()?);
            let value = edit(&mut *reader, &mut writer)
                .and_then(|value| writer.flush().map(|()| value))
                .map_err(|source| EditorError::io(target, source))?;
            drop(writer);
            txn.publish()?;
            Ok((value, "content rewritten".to_owned()))
        })
    }

    /// Replaces bytes `start..end` of `path` with `replacement`.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidRange`] when `start > end` or `end`
    /// is past the end of the file.
    pub fn partial_replace(
        &self,
        path: impl AsRef<Path>,
        start: u64,
        end: u64,
        replacement: &[u8],
    ) -> Result<(), EditorError> {
        let target = path.as_ref();
        self.guarded(OperationKind::PartialReplace, target, |txn| {
            let size = file_size(target)?;
            if start > end || end > size {
                return Err(EditorError::InvalidRange {
                    path: target.to_path_buf(),
                    start,
                    end,
                    size,
                });
            }
            self.publish_splice(txn, start..end, replacement)?;
            Ok(((), format!("bytes {start}..{end} -> {} bytes", replacement.len())))
        })
    }

    /// Replaces lines `start..end` (0-based, half-open) with `lines`.
    ///
    /// `start == end` inserts before line `start`; `start == line_count`
    /// appends. New lines are terminated with `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::OutOfRange`](crate::line_index::LineIndexError::OutOfRange)
    /// for an inverted range or one that reaches past the last line.
    pub fn replace_lines<S: AsRef<str>>(
        &self,
        path: impl AsRef<Path>,
        start: usize,
        end: usize,
        lines: &[S],
    ) -> Result<(), EditorError> {
        let target = path.as_ref();
        self.guarded(OperationKind::ReplaceLines, target, |txn| {
            let index = LineIndex::build(target)?;
            let (range, replacement) = index.line_splice(start, end, lines)?;
            self.publish_splice(txn, range, &replacement)?;
            Ok(((), format!("lines {start}..{end} -> {} lines", lines.len())))
        })
    }

    /// Replaces line `line` (0-based) with `content`.
    ///
    /// # Errors
    ///
    /// Returns [`LineIndexError::OutOfRange`](crate::line_index::LineIndexError::OutOfRange)
    /// when the line does not exist.
    pub fn replace_line(
        &self,
        path: impl AsRef<Path>,
        line: usize,
        content: &str,
    ) -> Result<(), EditorError> {
        let target = path.as_ref();
        self.guarded(OperationKind::ReplaceLines, target, |txn| {
            let index = LineIndex::build(target)?;
            index.byte_range(line)?;
            let (range, replacement) = index.line_splice(line, line + 1, &[content])?;
            self.publish_splice(txn, range, &replacement)?;
            Ok(((), format!("line {line}")))
        })
    }

    /// Streams every line of `path` through `transform`, dropping lines for
    /// which it returns `None`. Returns the number of lines written.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Io`] when reading or writing fails.
    pub fn transform_lines<F>(
        &self,
        path: impl AsRef<Path>,
        transform: F,
    ) -> Result<usize, EditorError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let target = path.as_ref();
        self.guarded(OperationKind::Transform, target, |txn| {
            let stream = StreamEditor::new(target, self.options.chunk_size());
            let written = stream
                .transform_lines(txn.open_staging()?, transform)
                .map_err(|source| EditorError::io(target, source))?;
            txn.publish()?;
            Ok((written, format!("{written} lines written")))
        })
    }

    /// Streams `path` through [`StreamEditor::process_with_context`],
    /// rewriting the lines `condition` selects. Returns how many lines
    /// were transformed.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Io`] when reading or writing fails.
    pub fn transform_with_context<C, T>(
        &self,
        path: impl AsRef<Path>,
        context_lines: usize,
        condition: C,
        transform: T,
    ) -> Result<usize, EditorError>
    where
        C: FnMut(&str, &VecDeque<String>) -> bool,
        T: FnMut(&str, &VecDeque<String>, &[String]) -> String,
    {
        let target = path.as_ref();
        self.guarded(OperationKind::Transform, target, |txn| {
            let stream = StreamEditor::new(target, self.options.chunk_size());
            let transformed = stream
                .process_with_context(txn.open_staging()?, context_lines, condition, transform)
                .map_err(|source| EditorError::io(target, source))?;
            txn.publish()?;
            Ok((transformed, format!("{transformed} lines transformed in context")))
        })
    }

    /// Replaces every `old` in `path` with the same-length `new`.
    ///
    /// The search runs over a memory-mapped staging copy, which is
    /// published only when something was replaced. Returns the number of
    /// replacements.
    ///
    /// # Errors
    ///
    /// Returns [`MappedError::LengthMismatch`](crate::mapped::MappedError::LengthMismatch)
    /// when the patterns differ in length, [`EditorError::Io`] when the
    /// target cannot be copied, plus the errors of [`begin`](Self::begin)
    /// and of publishing.
    pub fn find_replace(
        &self,
        path: impl AsRef<Path>,
        old: &[u8],
        new: &[u8],
    ) -> Result<usize, EditorError> {
        let target = path.as_ref();
        self.guarded(OperationKind::FindReplace, target, |txn| {
            let mut staged = txn.open_staging()?;
            File::open(target)
                .and_then(|mut source| io::copy(&mut source, &mut staged))
                .map_err(|source| EditorError::io(target, source))?;
            drop(staged);
            let staging = txn.staging_path()?.to_path_buf();
            let mut mapped = MappedFile::open_writable(&staging)?;
            let replaced = mapped.replace_all(old, new, ..)?;
            mapped.flush()?;
            drop(mapped);
            if replaced > 0 {
                txn.publish()?;
            }
            Ok((replaced, format!("{replaced} occurrences replaced")))
        })
    }

    /// Reads lines `start..end` of `path` through a fresh line index,
    /// clipped to the lines that exist.
    ///
    /// Reads take no lock: they observe the content before or after any
    /// concurrent publish, never a mixture.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::FileTooLarge`] or a line index error.
    pub fn read_lines(
        &self,
        path: impl AsRef<Path>,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, EditorError> {
        let target = path.as_ref();
        let _measurement = self.monitor.measure(OperationKind::Read.as_str());
        let outcome = self.check_size(target).and_then(|()| {
            LineIndex::build(target)?
                .get_lines(start, end)
                .map_err(EditorError::from)
        });
        match &outcome {
            Ok(lines) => self.audit(
                OperationKind::Read,
                target,
                format!("lines {start}..{end} ({} returned)", lines.len()),
            ),
            Err(error) => self.audit(OperationKind::Read, target, format!("failed: {error}")),
        }
        outcome
    }

    /// Runs `body` in a transaction on `target`, timing and auditing it.
    ///
    /// `body` returns its value together with the audit detail.
    fn guarded<T, F>(&self, kind: OperationKind, target: &Path, body: F) -> Result<T, EditorError>
    where
        F: FnOnce(&mut FileTransaction) -> Result<(T, String), EditorError>,
    {
        let _measurement = self.monitor.measure(kind.as_str());
        let outcome = self
            .check_size(target)
            .and_then(|()| self.begin(target))
            .and_then(|transaction| transaction.scoped(body));

        match outcome {
            Ok(report) => {
                let ((value, detail), transaction_log) = report.into_parts();
                info!(
                    target: EDITOR_TARGET,
                    operation = kind.as_str(),
                    path = %target.display(),
                    detail = %detail,
                    "operation committed"
                );
                let mut records = self.records();
                records.append(transaction_log);
                records.record(kind, target, detail);
                Ok(value)
            }
            Err(error) => {
                warn!(
                    target: EDITOR_TARGET,
                    operation = kind.as_str(),
                    path = %target.display(),
                    error = %error,
                    "operation failed"
                );
                self.audit(kind, target, format!("failed: {error}"));
                Err(error)
            }
        }
    }

    fn publish_splice(
        &self,
        txn: &mut FileTransaction,
        range: Range<u64>,
        replacement: &[u8],
    ) -> Result<(), EditorError> {
        let target = txn.target().to_path_buf();
        let staging = txn.open_staging()?;
        debug!(
            target: EDITOR_TARGET,
            path = %target.display(),
            start = range.start,
            end = range.end,
            bytes = replacement.len(),
            chunk_size = self.options.chunk_size(),
            "splicing into staging file"
        );
        copy_spliced(&target, range, replacement, staging)
            .map_err(|source| EditorError::io(&target, source))?;
        txn.publish()?;
        Ok(())
    }

    fn check_size(&self, target: &Path) -> Result<(), EditorError> {
        let size = match target.metadata() {
            Ok(metadata) => metadata.len(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(EditorError::io(target, source)),
        };
        let limit = self.options.max_file_size();
        if size > limit {
            return Err(EditorError::FileTooLarge {
                path: target.to_path_buf(),
                size,
                limit,
            });
        }
        Ok(())
    }

    fn audit(&self, kind: OperationKind, target: &Path, detail: String) {
        self.records().record(kind, target, detail);
    }

    fn records(&self) -> MutexGuard<'_, OperationLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn file_size(target: &Path) -> Result<u64, EditorError> {
    target
        .metadata()
        .map(|metadata| metadata.len())
        .map_err(|source| EditorError::io(target, source))
}
