pub mod name;

pub use name::MediaName;

use crate::error::ScanWarning;
use crate::fs::FileSystem;
use crate::metadata::{self, Extracted, MetadataExtractor};
use crate::model::{CaptureTime, MediaRecord, RootId};
use crate::progress::ProgressReporter;
use glob::Pattern;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info, trace};

/// Everything the scanner found. `scanned` counts every regular file seen,
/// recognized or not.
#[derive(Debug, Default)]
pub struct Inventory {
    pub records: Vec<MediaRecord>,
    pub warnings: Vec<ScanWarning>,
    pub scanned: usize,
}

impl Inventory {
    pub fn unrecognized(&self) -> impl Iterator<Item = &PathBuf> {
        self.warnings.iter().filter_map(|w| match w {
            ScanWarning::Unrecognized(path) => Some(path),
            _ => None,
        })
    }
}

pub fn compile_ignore_patterns(globs: &[String]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

fn is_ignored(root: &Path, path: &Path, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    path.ancestors()
        .take_while(|ancestor| *ancestor != root)
        .any(|ancestor| patterns.iter().any(|p| p.matches_path(ancestor)))
}

struct Candidate {
    root_id: RootId,
    path: PathBuf,
    name: MediaName,
}

/// Walk every root and build the media inventory. Read-only; per-file
/// problems become warnings and never abort the scan. Metadata extraction
/// runs on the current rayon pool.
pub fn scan(
    fs: &dyn FileSystem,
    extractor: &dyn MetadataExtractor,
    roots: &[(RootId, PathBuf)],
    ignore_patterns: &[Pattern],
    reporter: &dyn ProgressReporter,
) -> Inventory {
    let start = Instant::now();
    reporter.on_scan_started(roots.len());
    info!("Scanning {} root(s)...", roots.len());

    let mut warnings = Vec::new();
    let mut candidates = Vec::new();
    let mut scanned = 0usize;
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for (root_id, root) in roots {
        let listing = match fs.list_entries(root) {
            Ok(listing) => listing,
            Err(err) => {
                error!("Cannot scan root {}: {}", root.display(), err);
                warnings.push(ScanWarning::UnreadableEntry {
                    path: root.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        warnings.extend(
            listing
                .errors
                .into_iter()
                .map(|(path, reason)| ScanWarning::UnreadableEntry { path, reason }),
        );

        for entry in listing.entries {
            if entry.is_directory || is_ignored(root, &entry.path, ignore_patterns) {
                continue;
            }
            // a file reachable from two roots belongs to the first one
            if !seen.insert(entry.path.clone()) {
                debug!("Skipping {} already seen under an earlier root", entry.path.display());
                continue;
            }
            scanned += 1;
            reporter.on_scan_progress(scanned, &entry.path);
            match MediaName::from_path(&entry.path) {
                Some(name) => candidates.push(Candidate {
                    root_id: *root_id,
                    path: entry.path,
                    name,
                }),
                None => {
                    trace!("Unrecognized file name {}", entry.path.display());
                    warnings.push(ScanWarning::Unrecognized(entry.path));
                }
            }
        }
    }

    let extracted = AtomicUsize::new(0);
    let metadata_warnings: Mutex<Vec<ScanWarning>> = Mutex::new(Vec::new());
    let mut records: Vec<MediaRecord> = candidates
        .into_par_iter()
        .filter_map(|candidate| {
            let record = build_record(fs, extractor, candidate, &metadata_warnings);
            extracted.fetch_add(1, Ordering::Relaxed);
            record
        })
        .collect();

    records.sort_by(|a, b| {
        a.root_id
            .cmp(&b.root_id)
            .then_with(|| a.original_path.cmp(&b.original_path))
    });
    warnings.extend(
        metadata_warnings
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
    );

    let inventory = Inventory {
        records,
        warnings,
        scanned,
    };
    let unrecognized = inventory.unrecognized().count();
    let duration = start.elapsed();
    debug!(
        "Scan completed in {:.2}s: {} files, {} recognized, {} unrecognized, {} metadata lookups",
        duration.as_secs_f64(),
        scanned,
        inventory.records.len(),
        unrecognized,
        extracted.load(Ordering::Relaxed),
    );
    reporter.on_scan_complete(inventory.records.len(), unrecognized, duration.as_secs_f64());
    inventory
}

fn build_record(
    fs: &dyn FileSystem,
    extractor: &dyn MetadataExtractor,
    candidate: Candidate,
    warnings: &Mutex<Vec<ScanWarning>>,
) -> Option<MediaRecord> {
    let Candidate {
        root_id,
        path,
        name,
    } = candidate;
    let push_warning = |warning: ScanWarning| {
        if let Ok(mut guard) = warnings.lock() {
            guard.push(warning);
        }
    };

    let mime_hint = metadata::mime_hint(&name.extension);
    let capture_time = match extractor.extract_capture_time(&path, mime_hint) {
        Extracted::Found(at) => Some(CaptureTime::metadata(at)),
        Extracted::NotAvailable => None,
        Extracted::Failed(reason) => {
            debug!("Metadata unreadable for {}: {}", path.display(), reason);
            push_warning(ScanWarning::MetadataUnavailable {
                path: path.clone(),
                reason,
            });
            None
        }
    };

    let capture_time = match capture_time {
        Some(time) => time,
        None => match fs.modified_time(&path) {
            Ok(modified) => CaptureTime::fallback(metadata::local_time(modified)),
            Err(err) => {
                error!("Error getting metadata for {}: {}", path.display(), err);
                push_warning(ScanWarning::UnreadableEntry {
                    path,
                    reason: err.to_string(),
                });
                return None;
            }
        },
    };

    Some(MediaRecord {
        root_id,
        original_path: path,
        prefix: name.prefix,
        original_index: name.index,
        index_width: name.width,
        collision_suffix: name.collision_suffix,
        extension: name.extension,
        staged: name.staging_token.is_some(),
        capture_time,
        content_digest: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use crate::model::Provenance;
    use crate::progress::SilentReporter;
    use std::fs;
    use tempfile::tempdir;

    struct NoMetadata;

    impl MetadataExtractor for NoMetadata {
        fn extract_capture_time(&self, path: &Path, _mime_hint: &str) -> Extracted {
            if path.to_string_lossy().contains("broken") {
                Extracted::Failed("truncated EXIF block".to_string())
            } else {
                Extracted::NotAvailable
            }
        }
    }

    #[test]
    fn test_scan_records_and_unrecognized() {
        let tmp = tempdir().unwrap();
        let internal = tmp.path().join("internal");
        let card = tmp.path().join("card");
        fs::create_dir_all(internal.join("sub")).unwrap();
        fs::create_dir_all(&card).unwrap();
        fs::write(internal.join("DSC_0001.JPG"), b"a").unwrap();
        fs::write(internal.join("sub").join("MOV_0002.mp4"), b"b").unwrap();
        fs::write(card.join("DSC_0001_1.jpg"), b"c").unwrap();
        fs::write(card.join("readme.txt"), b"d").unwrap();

        let roots = vec![(0, internal.clone()), (1, card.clone())];
        let inventory = scan(&LocalFs, &NoMetadata, &roots, &[], &SilentReporter);

        assert_eq!(inventory.scanned, 4);
        assert_eq!(inventory.records.len(), 3);
        let unrecognized: Vec<_> = inventory.unrecognized().collect();
        assert_eq!(unrecognized, vec![&card.join("readme.txt")]);

        let card_record = inventory
            .records
            .iter()
            .find(|r| r.root_id == 1)
            .unwrap();
        assert_eq!(card_record.collision_suffix, Some(1));
        assert_eq!(card_record.capture_time.provenance, Provenance::Fallback);
        assert!(card_record.content_digest.is_none());
    }

    #[test]
    fn test_scan_ignore_patterns() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join(".thumbnails")).unwrap();
        fs::write(root.join(".thumbnails").join("DSC_0001.jpg"), b"t").unwrap();
        fs::write(root.join("DSC_0002_broken.jpg"), b"x").unwrap();
        fs::write(root.join("DSC_0003.jpg"), b"y").unwrap();

        let patterns = compile_ignore_patterns(&["*/.thumbnails".to_string(), "[".to_string()]);
        assert_eq!(patterns.len(), 1);

        let inventory = scan(
            &LocalFs,
            &NoMetadata,
            &[(0, root.clone())],
            &patterns,
            &SilentReporter,
        );
        // DSC_0002_broken.jpg does not match the name pattern at all
        assert_eq!(inventory.records.len(), 1);
        assert_eq!(inventory.scanned, 2);
        assert_eq!(inventory.records[0].original_index, 3);
    }

    #[test]
    fn test_metadata_failure_degrades_to_fallback() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("broken");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("DSC_0004.jpg"), b"z").unwrap();

        let inventory = scan(&LocalFs, &NoMetadata, &[(0, root)], &[], &SilentReporter);
        assert_eq!(inventory.records.len(), 1);
        assert_eq!(inventory.records[0].capture_time.provenance, Provenance::Fallback);
        assert!(matches!(
            inventory.warnings.as_slice(),
            [ScanWarning::MetadataUnavailable { .. }]
        ));
    }

    #[test]
    fn test_file_under_two_roots_is_recorded_once() {
        let tmp = tempdir().unwrap();
        let card = tmp.path().join("card");
        fs::create_dir_all(card.join("100NIKON")).unwrap();
        fs::write(card.join("100NIKON").join("DSC_0005.jpg"), b"only").unwrap();

        let roots = vec![
            (0, card.clone()),
            (1, card.clone()),
            (2, card.join("100NIKON")),
        ];
        let inventory = scan(&LocalFs, &NoMetadata, &roots, &[], &SilentReporter);

        assert_eq!(inventory.scanned, 1);
        assert_eq!(inventory.records.len(), 1);
        assert_eq!(inventory.records[0].root_id, 0);
    }

    #[test]
    fn test_missing_root_is_a_warning() {
        let tmp = tempdir().unwrap();
        let inventory = scan(
            &LocalFs,
            &NoMetadata,
            &[(0, tmp.path().join("absent"))],
            &[],
            &SilentReporter,
        );
        assert!(inventory.records.is_empty());
        assert_eq!(inventory.warnings.len(), 1);
    }
}
