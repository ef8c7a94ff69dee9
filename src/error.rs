use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Plan conflict: {0}")]
    PlanConflict(#[from] PlanConflict),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Structural invariant violations found while building a rename plan.
/// Always raised before the filesystem is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanConflict {
    #[error(
        "{} and {} both resolve to {}",
        .first.display(),
        .second.display(),
        .destination.display()
    )]
    DuplicateDestination {
        destination: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("no free staging name for {}", .0.display())]
    NoStagingName(PathBuf),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to move {} to {}: {reason}", .source_path.display(), .destination.display())]
pub struct MoveError {
    pub source_path: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to copy {} to {}: {reason}", .source_path.display(), .destination.display())]
pub struct CopyError {
    pub source_path: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to delete {}: {reason}", .path.display())]
pub struct DeleteError {
    pub path: PathBuf,
    pub reason: String,
}

/// Recoverable, per-file problems. Collected and reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    Unrecognized(PathBuf),
    MetadataUnavailable { path: PathBuf, reason: String },
    UnreadableEntry { path: PathBuf, reason: String },
    DigestFailed { path: PathBuf, reason: String },
}

impl ScanWarning {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Unrecognized(path) => path,
            Self::MetadataUnavailable { path, .. } => path,
            Self::UnreadableEntry { path, .. } => path,
            Self::DigestFailed { path, .. } => path,
        }
    }
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecognized(path) => write!(f, "unrecognized file name: {}", path.display()),
            Self::MetadataUnavailable { path, reason } => write!(
                f,
                "capture metadata unreadable for {}, using modification time: {}",
                path.display(),
                reason
            ),
            Self::UnreadableEntry { path, reason } => {
                write!(f, "could not read {}: {}", path.display(), reason)
            }
            Self::DigestFailed { path, reason } => write!(
                f,
                "could not digest {}, keeping it as a distinct file: {}",
                path.display(),
                reason
            ),
        }
    }
}
