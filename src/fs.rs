//! Filesystem capability consumed by the pipeline.
//!
//! Everything that touches disk goes through [`FileSystem`], so tests can
//! wrap [`LocalFs`] to inject failures without changing the stages.

use crate::error::{CopyError, DeleteError, MoveError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{trace, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub path: PathBuf,
    pub is_directory: bool,
}

/// Listing failures below the root are returned alongside the entries that
/// could be read.
#[derive(Debug, Default)]
pub struct Listing {
    pub entries: Vec<FsEntry>,
    pub errors: Vec<(PathBuf, String)>,
}

pub trait FileSystem: Send + Sync {
    /// Every entry beneath `root`, recursively. Symlinks are not followed.
    fn list_entries(&self, root: &Path) -> io::Result<Listing>;
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
    fn modified_time(&self, path: &Path) -> io::Result<SystemTime>;
    fn exists(&self, path: &Path) -> bool;
    fn move_entry(&self, source: &Path, destination: &Path) -> Result<(), MoveError>;
    fn delete_entry(&self, path: &Path) -> Result<(), DeleteError>;
    /// Copy a file to a destination that must not exist yet, keeping the
    /// source's modification time.
    fn copy_entry(&self, source: &Path, destination: &Path) -> Result<(), CopyError>;
    fn create_directory(&self, path: &Path) -> io::Result<()>;
}

/// `std::fs` backed implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn list_entries(&self, root: &Path) -> io::Result<Listing> {
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("root {} is not a directory", root.display()),
            ));
        }

        let mut listing = Listing::default();
        for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_symlink() {
                        trace!("Skipping symlink {}", entry.path().display());
                        continue;
                    }
                    listing.entries.push(FsEntry {
                        path: entry.path().to_path_buf(),
                        is_directory: entry.file_type().is_dir(),
                    });
                }
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    warn!("Error reading entry under {}: {}", root.display(), err);
                    listing.errors.push((path, err.to_string()));
                }
            }
        }
        Ok(listing)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::BufReader::new(File::open(path)?)))
    }

    fn modified_time(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn move_entry(&self, source: &Path, destination: &Path) -> Result<(), MoveError> {
        fs::rename(source, destination).map_err(|err| MoveError {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
            reason: err.to_string(),
        })
    }

    fn delete_entry(&self, path: &Path) -> Result<(), DeleteError> {
        fs::remove_file(path).map_err(|err| DeleteError {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    fn copy_entry(&self, source: &Path, destination: &Path) -> Result<(), CopyError> {
        let copy_error = |err: io::Error| CopyError {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
            reason: err.to_string(),
        };
        let mut reader = File::open(source).map_err(copy_error)?;
        let modified = reader.metadata().and_then(|m| m.modified()).map_err(copy_error)?;
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(copy_error)?;

        let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.set_modified(modified));
        if let Err(err) = copied {
            drop(writer);
            if let Err(cleanup) = fs::remove_file(destination) {
                warn!("Could not remove partial copy {}: {}", destination.display(), cleanup);
            }
            return Err(copy_error(err));
        }
        Ok(())
    }

    fn create_directory(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}
