use crate::error::ScanWarning;
use crate::fs::FileSystem;
use crate::hasher::{ContentDigest, ContentDigester};
use crate::model::{CanonicalUnit, CaptureTime, MediaRecord, Redundant, UnitId};
use crate::progress::ProgressReporter;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Default)]
pub struct Classification {
    pub units: Vec<CanonicalUnit>,
    pub redundant: Vec<Redundant>,
    pub warnings: Vec<ScanWarning>,
    /// Groups with more than one member.
    pub collision_groups: usize,
}

/// Group records by `(prefix, index)` and collapse byte-identical members.
///
/// Digests are only computed for groups with more than one member, on the
/// current rayon pool. A member that cannot be digested stays a distinct
/// unit: losing a capture is worse than keeping a duplicate.
///
/// With `copies_survive` false the redundant copies are about to be deleted,
/// so a unit keeps its representative's own capture time. Otherwise the best
/// stamp among the identical members is used.
pub fn classify(
    fs: &dyn FileSystem,
    digester: &dyn ContentDigester,
    records: Vec<MediaRecord>,
    copies_survive: bool,
    reporter: &dyn ProgressReporter,
) -> Classification {
    let start = Instant::now();
    let mut groups: BTreeMap<(String, u32), Vec<MediaRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.group_key()).or_default().push(record);
    }

    let to_digest: Vec<&MediaRecord> = groups
        .values()
        .filter(|members| members.len() > 1)
        .flatten()
        .collect();
    info!(
        "Digesting {} files in {} collision groups...",
        to_digest.len(),
        groups.values().filter(|m| m.len() > 1).count()
    );

    let digests: DashMap<PathBuf, Result<ContentDigest, String>> = DashMap::new();
    let digested = AtomicUsize::new(0);
    let total = to_digest.len();
    to_digest.par_iter().for_each(|record| {
        let result = digest_file(fs, digester, &record.original_path).map_err(|e| e.to_string());
        digests.insert(record.original_path.clone(), result);
        let done = digested.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.on_digest_progress(done, total);
    });

    let mut classification = Classification::default();
    for ((prefix, index), members) in groups {
        if members.len() > 1 {
            classification.collision_groups += 1;
        }
        let units_before = classification.units.len();
        let redundant_before = classification.redundant.len();
        resolve_group(members, &digests, copies_survive, &mut classification);
        let units = classification.units.len() - units_before;
        let redundant = classification.redundant.len() - redundant_before;
        if units + redundant > 1 {
            debug!(
                "{}_{}: {} distinct, {} redundant",
                prefix, index, units, redundant
            );
            reporter.on_group_resolved(&prefix, index, units, redundant);
        }
    }

    debug!(
        "Classification completed in {:.2}s: {} units, {} redundant, {} collision groups",
        start.elapsed().as_secs_f64(),
        classification.units.len(),
        classification.redundant.len(),
        classification.collision_groups,
    );
    classification
}

pub(crate) fn digest_file(
    fs: &dyn FileSystem,
    digester: &dyn ContentDigester,
    path: &Path,
) -> std::io::Result<ContentDigest> {
    let mut reader = fs.open(path)?;
    let digest = digester.digest_reader(&mut reader)?;
    trace!("Digest {} for {}", digest, path.display());
    Ok(digest)
}

/// Representative preference: highest-priority root, then shortest path,
/// then lexicographic path.
fn representative_key(record: &MediaRecord) -> (u32, usize, &Path) {
    (
        record.root_id,
        record.original_path.as_os_str().len(),
        record.original_path.as_path(),
    )
}

fn resolve_group(
    members: Vec<MediaRecord>,
    digests: &DashMap<PathBuf, Result<ContentDigest, String>>,
    copies_survive: bool,
    out: &mut Classification,
) {
    let mut subgroups: Vec<Vec<MediaRecord>> = Vec::new();

    if members.len() == 1 {
        subgroups.push(members);
    } else {
        let mut by_digest: BTreeMap<ContentDigest, Vec<MediaRecord>> = BTreeMap::new();
        for mut record in members {
            let outcome = digests
                .get(&record.original_path)
                .map(|entry| entry.value().clone())
                .unwrap_or_else(|| Err("digest missing".to_string()));
            match outcome {
                Ok(digest) => {
                    record.content_digest = Some(digest);
                    by_digest.entry(digest).or_default().push(record);
                }
                Err(reason) => {
                    warn!(
                        "Could not digest {}, keeping it as distinct: {}",
                        record.original_path.display(),
                        reason
                    );
                    out.warnings.push(ScanWarning::DigestFailed {
                        path: record.original_path.clone(),
                        reason,
                    });
                    subgroups.push(vec![record]);
                }
            }
        }
        subgroups.extend(by_digest.into_values());
    }

    for members in &mut subgroups {
        members.sort_by(|a, b| representative_key(a).cmp(&representative_key(b)));
    }
    subgroups.sort_by(|a, b| representative_key(&a[0]).cmp(&representative_key(&b[0])));

    for members in subgroups {
        let id = UnitId(out.units.len());
        let representative = &members[0];
        let mut unit = CanonicalUnit::from_record(id, representative);
        if copies_survive {
            unit.capture_time = group_capture_time(&members);
        }
        unit.index_width = members.iter().map(|m| m.index_width).max().unwrap_or(unit.index_width);

        for duplicate in members.iter().skip(1) {
            trace!(
                "{} duplicates {}",
                duplicate.original_path.display(),
                representative.original_path.display()
            );
            unit.duplicates.push(duplicate.original_path.clone());
            out.redundant.push(Redundant {
                path: duplicate.original_path.clone(),
                root_id: duplicate.root_id,
                representative: representative.original_path.clone(),
            });
        }
        out.units.push(unit);
    }
}

/// Copies often carry a fresh modification time, so the most trustworthy
/// stamp in the subgroup wins: metadata before fallback, earliest first.
fn group_capture_time(members: &[MediaRecord]) -> CaptureTime {
    members
        .iter()
        .map(|m| m.capture_time)
        .min_by(|a, b| a.provenance.cmp(&b.provenance).then_with(|| a.at.cmp(&b.at)))
        .unwrap_or(members[0].capture_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use crate::hasher::Blake3Digester;
    use crate::model::Provenance;
    use crate::progress::SilentReporter;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn record(root_id: u32, path: PathBuf, index: u32, suffix: Option<u32>, secs: u32) -> MediaRecord {
        MediaRecord {
            root_id,
            original_path: path,
            prefix: "DSC".to_string(),
            original_index: index,
            index_width: 4,
            collision_suffix: suffix,
            extension: "jpg".to_string(),
            staged: false,
            capture_time: CaptureTime::fallback(
                NaiveDate::from_ymd_opt(2023, 7, 1)
                    .unwrap()
                    .and_hms_opt(9, 0, secs)
                    .unwrap(),
            ),
            content_digest: None,
        }
    }

    #[test]
    fn test_singletons_are_not_digested() {
        let tmp = tempdir().unwrap();
        // Files do not exist: digesting them would produce warnings.
        let records = vec![
            record(0, tmp.path().join("DSC_0001.jpg"), 1, None, 1),
            record(0, tmp.path().join("DSC_0002.jpg"), 2, None, 2),
        ];
        let result = classify(&LocalFs, &Blake3Digester, records, true, &SilentReporter);
        assert_eq!(result.units.len(), 2);
        assert!(result.redundant.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(result.collision_groups, 0);
        assert!(result.units.iter().all(|u| u.digest.is_none()));
    }

    #[test]
    fn test_identical_members_collapse_to_priority_root() {
        let tmp = tempdir().unwrap();
        let internal = tmp.path().join("internal");
        let card = tmp.path().join("card");
        fs::create_dir_all(&internal).unwrap();
        fs::create_dir_all(&card).unwrap();
        fs::write(internal.join("DSC_0001_1.jpg"), b"same bytes").unwrap();
        fs::write(card.join("DSC_0001.jpg"), b"same bytes").unwrap();

        let records = vec![
            record(1, card.join("DSC_0001.jpg"), 1, None, 30),
            record(0, internal.join("DSC_0001_1.jpg"), 1, Some(1), 10),
        ];
        let result = classify(&LocalFs, &Blake3Digester, records, true, &SilentReporter);
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].path, internal.join("DSC_0001_1.jpg"));
        assert_eq!(result.units[0].duplicates, vec![card.join("DSC_0001.jpg")]);
        assert_eq!(result.redundant.len(), 1);
        assert_eq!(result.redundant[0].path, card.join("DSC_0001.jpg"));
        assert_eq!(result.redundant[0].representative, internal.join("DSC_0001_1.jpg"));
        assert_eq!(result.collision_groups, 1);
    }

    #[test]
    fn test_same_root_prefers_shortest_path() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("DSC_0004.jpg"), b"x").unwrap();
        fs::write(tmp.path().join("DSC_0004_1.jpg"), b"x").unwrap();
        let records = vec![
            record(0, tmp.path().join("DSC_0004_1.jpg"), 4, Some(1), 1),
            record(0, tmp.path().join("DSC_0004.jpg"), 4, None, 1),
        ];
        let result = classify(&LocalFs, &Blake3Digester, records, true, &SilentReporter);
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].path, tmp.path().join("DSC_0004.jpg"));
    }

    #[test]
    fn test_distinct_members_stay_separate() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("DSC_0003.jpg"), b"first capture").unwrap();
        fs::write(tmp.path().join("DSC_0003_1.jpg"), b"second capture").unwrap();
        let records = vec![
            record(0, tmp.path().join("DSC_0003.jpg"), 3, None, 1),
            record(0, tmp.path().join("DSC_0003_1.jpg"), 3, Some(1), 2),
        ];
        let result = classify(&LocalFs, &Blake3Digester, records, true, &SilentReporter);
        assert_eq!(result.units.len(), 2);
        assert!(result.redundant.is_empty());
        assert!(result.units.iter().all(|u| u.digest.is_some()));
        assert_ne!(result.units[0].id, result.units[1].id);
    }

    #[test]
    fn test_unreadable_member_is_preserved() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("DSC_0005.jpg"), b"bytes").unwrap();
        let records = vec![
            record(0, tmp.path().join("DSC_0005.jpg"), 5, None, 1),
            // vanished between scan and classification
            record(0, tmp.path().join("DSC_0005_1.jpg"), 5, Some(1), 1),
        ];
        let result = classify(&LocalFs, &Blake3Digester, records, true, &SilentReporter);
        assert_eq!(result.units.len(), 2);
        assert!(result.redundant.is_empty());
        assert!(matches!(
            result.warnings.as_slice(),
            [ScanWarning::DigestFailed { .. }]
        ));
    }

    #[test]
    fn test_group_capture_time_prefers_metadata() {
        let tmp = tempdir().unwrap();
        let mut a = record(0, tmp.path().join("a"), 1, None, 50);
        let b = record(0, tmp.path().join("b"), 1, None, 10);
        a.capture_time.provenance = Provenance::Metadata;
        let chosen = group_capture_time(&[b.clone(), a.clone()]);
        assert_eq!(chosen, a.capture_time);
        let chosen = group_capture_time(&[b.clone()]);
        assert_eq!(chosen, b.capture_time);
    }

    #[test]
    fn test_deleted_copies_do_not_lend_their_capture_time() {
        let tmp = tempdir().unwrap();
        let internal = tmp.path().join("internal");
        let card = tmp.path().join("card");
        fs::create_dir_all(&internal).unwrap();
        fs::create_dir_all(&card).unwrap();
        fs::write(internal.join("MOV_0001.mp4"), b"clip").unwrap();
        fs::write(card.join("MOV_0001.mp4"), b"clip").unwrap();
        let records = || {
            vec![
                record(0, internal.join("MOV_0001.mp4"), 1, None, 40),
                record(1, card.join("MOV_0001.mp4"), 1, None, 10),
            ]
        };

        let kept = classify(&LocalFs, &Blake3Digester, records(), true, &SilentReporter);
        assert_eq!(kept.units[0].capture_time, records()[1].capture_time);

        let deleting = classify(&LocalFs, &Blake3Digester, records(), false, &SilentReporter);
        assert_eq!(deleting.units.len(), 1);
        assert_eq!(deleting.units[0].path, internal.join("MOV_0001.mp4"));
        assert_eq!(deleting.units[0].capture_time, records()[0].capture_time);
    }
}
