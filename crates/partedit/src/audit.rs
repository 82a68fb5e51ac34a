//! Append-only operation log shared by transactions and the editor facade.
//!
//! Transactions record the filesystem steps they take (backup, publish,
//! restore) and the editor facade records the agent-level operation that
//! triggered them. Records are never mutated or removed once appended; the log
//! lives for as long as its owner and is not persisted across restarts.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

/// Kind of step captured in an [`OperationRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// The target was copied to a backup before mutation.
    BackupCreated,
    /// The backup was deleted after a successful commit.
    BackupRemoved,
    /// The backup was moved back over the target during rollback.
    RestoredFromBackup,
    /// A target created by the transaction was removed during rollback.
    CreatedTargetRemoved,
    /// Staged content atomically replaced the target.
    AtomicReplace,
    /// Lines were read through a line index.
    Read,
    /// A byte range was replaced.
    PartialReplace,
    /// A range of lines was replaced.
    ReplaceLines,
    /// Every line was streamed through a transform.
    Transform,
    /// A caller-supplied edit function rewrote the file.
    SafeEdit,
    /// A byte pattern was replaced with one of the same length.
    FindReplace,
}

impl OperationKind {
    /// Stable snake_case name used in logs and exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BackupCreated => "backup_created",
            Self::BackupRemoved => "backup_removed",
            Self::RestoredFromBackup => "restored_from_backup",
            Self::CreatedTargetRemoved => "created_target_removed",
            Self::AtomicReplace => "atomic_replace",
            Self::Read => "read",
            Self::PartialReplace => "partial_replace",
            Self::ReplaceLines => "replace_lines",
            Self::Transform => "transform",
            Self::SafeEdit => "safe_edit",
            Self::FindReplace => "find_replace",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audited step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationRecord {
    #[serde(rename = "timestamp_ms", serialize_with = "serialize_unix_millis")]
    timestamp: SystemTime,
    #[serde(rename = "operation")]
    kind: OperationKind,
    target: PathBuf,
    detail: String,
}

impl OperationRecord {
    /// Builds a record stamped with the current wall-clock time.
    #[must_use]
    pub fn now(kind: OperationKind, target: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            kind,
            target: target.into(),
            detail: detail.into(),
        }
    }

    /// When the step happened.
    #[must_use]
    pub const fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// What kind of step this was.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// File the step applied to.
    #[must_use]
    pub fn target(&self) -> &Path {
        self.target.as_path()
    }

    /// Free-form detail, such as the backup path or the replaced range.
    #[must_use]
    pub fn detail(&self) -> &str {
        self.detail.as_str()
    }
}

fn serialize_unix_millis<S: Serializer>(
    time: &SystemTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default();
    serializer.serialize_u64(millis)
}

/// Append-only sequence of [`OperationRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OperationLog {
    records: Vec<OperationRecord>,
}

impl OperationLog {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record stamped with the current time.
    pub fn record(
        &mut self,
        kind: OperationKind,
        target: impl Into<PathBuf>,
        detail: impl Into<String>,
    ) {
        self.records.push(OperationRecord::now(kind, target, detail));
    }

    /// Appends every record of `other`, preserving their order.
    pub fn append(&mut self, other: Self) {
        self.records.extend(other.records);
    }

    /// All records in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[OperationRecord] {
        &self.records
    }

    /// Iterates over the records in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, OperationRecord> {
        self.records.iter()
    }

    /// Records of a single kind.
    pub fn of_kind(&self, kind: OperationKind) -> impl Iterator<Item = &OperationRecord> + '_ {
        self.records.iter().filter(move |record| record.kind == kind)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes the log as JSON Lines, one record per line.
    ///
    /// # Errors
    ///
    /// Returns an error when serialisation or the underlying writer fails.
    pub fn write_json_lines<W: Write>(&self, mut writer: W) -> Result<(), serde_json::Error> {
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n").map_err(serde_json::Error::io)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a OperationLog {
    type Item = &'a OperationRecord;
    type IntoIter = std::slice::Iter<'a, OperationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
