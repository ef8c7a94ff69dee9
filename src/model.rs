use crate::hasher::ContentDigest;
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Position of a root in the configured list. Lower is higher priority.
pub type RootId = u32;

/// Where a capture time came from. `Metadata` orders before `Fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Provenance {
    Metadata,
    Fallback,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata => f.write_str("metadata"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// Camera wall-clock time. EXIF carries no zone, so modification times are
/// converted to local time before they are compared with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureTime {
    pub at: NaiveDateTime,
    pub provenance: Provenance,
}

impl CaptureTime {
    pub fn metadata(at: NaiveDateTime) -> Self {
        Self {
            at,
            provenance: Provenance::Metadata,
        }
    }

    pub fn fallback(at: NaiveDateTime) -> Self {
        Self {
            at,
            provenance: Provenance::Fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub root_id: RootId,
    pub original_path: PathBuf,
    pub prefix: String,
    pub original_index: u32,
    pub index_width: usize,
    pub collision_suffix: Option<u32>,
    pub extension: String,
    /// Name carries a staging marker left by an interrupted run.
    pub staged: bool,
    pub capture_time: CaptureTime,
    pub content_digest: Option<ContentDigest>,
}

impl MediaRecord {
    pub fn group_key(&self) -> (String, u32) {
        (self.prefix.clone(), self.original_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub usize);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// One real capture going forward: the surviving representative plus the
/// paths of any byte-identical copies collapsed into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUnit {
    pub id: UnitId,
    pub root_id: RootId,
    pub path: PathBuf,
    pub prefix: String,
    pub original_index: u32,
    pub index_width: usize,
    pub extension: String,
    pub capture_time: CaptureTime,
    pub digest: Option<ContentDigest>,
    pub duplicates: Vec<PathBuf>,
}

impl CanonicalUnit {
    pub fn from_record(id: UnitId, record: &MediaRecord) -> Self {
        Self {
            id,
            root_id: record.root_id,
            path: record.original_path.clone(),
            prefix: record.prefix.clone(),
            original_index: record.original_index,
            index_width: record.index_width,
            extension: record.extension.clone(),
            capture_time: record.capture_time,
            digest: record.content_digest,
            duplicates: Vec::new(),
        }
    }

    /// Total order used by the sequencer: capture time, then metadata before
    /// fallback, lower index, higher-priority root, and finally path.
    pub fn timeline_cmp(&self, other: &Self) -> Ordering {
        self.capture_time
            .at
            .cmp(&other.capture_time.at)
            .then_with(|| {
                self.capture_time
                    .provenance
                    .cmp(&other.capture_time.provenance)
            })
            .then_with(|| self.original_index.cmp(&other.original_index))
            .then_with(|| self.root_id.cmp(&other.root_id))
            .then_with(|| self.path.cmp(&other.path))
    }
}

/// A byte-identical copy that loses to its representative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redundant {
    pub path: PathBuf,
    pub root_id: RootId,
    pub representative: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    pub prefix: String,
    /// Zero-padding width for destination indices.
    pub width: usize,
    pub units: Vec<CanonicalUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub unit_id: UnitId,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub staging: Option<PathBuf>,
    /// A kept redundant copy following its representative's new index.
    pub redundant_copy: bool,
}

impl PlanEntry {
    pub fn needs_staging(&self) -> bool {
        self.staging.is_some()
    }

    /// Path the file is moved from during commit.
    pub fn commit_source(&self) -> &Path {
        self.staging.as_deref().unwrap_or(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    /// Run-specific token embedded in staging names.
    pub token: String,
    pub entries: Vec<PlanEntry>,
    /// Units already at their canonical path.
    pub no_ops: usize,
    /// Kept redundant copies already at their follow name.
    pub copy_no_ops: usize,
}

impl RenamePlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn staged_count(&self) -> usize {
        self.entries.iter().filter(|e| e.needs_staging()).count()
    }

    pub fn unit_entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| !e.redundant_copy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Staged,
    Committed,
    /// `resting_at` is where the file sits after the failure.
    Failed { reason: String, resting_at: PathBuf },
}

impl EntryState {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Staged => "staged",
            Self::Committed => "committed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason, resting_at } => {
                write!(f, "failed ({}), file at {}", reason, resting_at.display())
            }
            other => f.write_str(other.label()),
        }
    }
}
