use crate::error::PlanConflict;
use crate::fs::FileSystem;
use crate::model::{CanonicalUnit, PlanEntry, RenamePlan, Timeline};
use crate::scanner::MediaName;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const MAX_STAGING_ATTEMPTS: u32 = 100;

/// Token embedded in this run's staging names.
pub fn run_token() -> String {
    format!(
        "{:x}{:x}",
        Utc::now().timestamp_millis(),
        std::process::id()
    )
}

/// Collision key. The file name is case-folded so two names differing only
/// in case are treated as the same file, which they are on FAT/exFAT cards.
/// Directories are compared as they are spelled on disk.
pub(crate) fn path_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match path.parent() {
        Some(parent) => parent.join(name).to_string_lossy().into_owned(),
        None => name,
    }
}

pub fn destination_for(unit: &CanonicalUnit, position: u32, width: usize) -> PathBuf {
    let name = MediaName::canonical_file_name(&unit.prefix, position, width, &unit.extension);
    match unit.path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Follow names for the kept byte-identical copies of `unit` once it sits at
/// `position`. A copy outside the representative's directory takes the plain
/// name; anything sharing a directory with the representative or with an
/// earlier copy gets a numbered name.
fn copy_destinations(
    unit: &CanonicalUnit,
    representative_destination: &Path,
    position: u32,
    width: usize,
) -> Vec<(PathBuf, PathBuf)> {
    let mut copies: Vec<&PathBuf> = unit.duplicates.iter().collect();
    copies.sort();

    let representative_dir = representative_destination.parent();
    let mut used: HashSet<String> = HashSet::new();
    used.insert(path_key(representative_destination));

    let mut out = Vec::with_capacity(copies.len());
    for copy in copies {
        let parent = copy.parent().unwrap_or_else(|| Path::new(""));
        let plain = parent.join(MediaName::canonical_file_name(
            &unit.prefix,
            position,
            width,
            &unit.extension,
        ));
        let destination = if Some(parent) != representative_dir && !used.contains(&path_key(&plain)) {
            plain
        } else {
            (1u32..)
                .map(|n| {
                    parent.join(MediaName::copy_file_name(
                        &unit.prefix,
                        position,
                        width,
                        n,
                        &unit.extension,
                    ))
                })
                .find(|candidate| !used.contains(&path_key(candidate)))
                .unwrap_or(plain)
        };
        used.insert(path_key(&destination));
        out.push((copy.clone(), destination));
    }
    out
}

/// Map each timeline position to its canonical name and work out which moves
/// have to go through a staging name first.
///
/// With `keep_copies` set, the redundant copies behind each unit stay on disk
/// and are renamed along with their representative so the next run sees the
/// same groups again. Without it they are expected to be deleted before the
/// plan runs and get no entries.
pub fn build_plan(
    timelines: &BTreeMap<String, Timeline>,
    keep_copies: bool,
    token: &str,
    fs: &dyn FileSystem,
) -> Result<RenamePlan, PlanConflict> {
    let mut entries: Vec<PlanEntry> = Vec::new();
    let mut no_ops = 0usize;
    let mut copy_no_ops = 0usize;
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    let mut claim = |destination: &Path, source: &Path| match claimed
        .insert(path_key(destination), source.to_path_buf())
    {
        Some(first) => Err(PlanConflict::DuplicateDestination {
            destination: destination.to_path_buf(),
            first,
            second: source.to_path_buf(),
        }),
        None => Ok(()),
    };

    for timeline in timelines.values() {
        for (position, unit) in timeline.units.iter().enumerate() {
            let position = position as u32 + 1;
            let destination = destination_for(unit, position, timeline.width);
            claim(&destination, &unit.path)?;

            if keep_copies {
                for (copy, copy_destination) in
                    copy_destinations(unit, &destination, position, timeline.width)
                {
                    claim(&copy_destination, &copy)?;
                    if copy_destination == copy {
                        copy_no_ops += 1;
                        continue;
                    }
                    entries.push(PlanEntry {
                        unit_id: unit.id,
                        source: copy,
                        destination: copy_destination,
                        staging: None,
                        redundant_copy: true,
                    });
                }
            }

            if destination == unit.path {
                no_ops += 1;
                continue;
            }
            entries.push(PlanEntry {
                unit_id: unit.id,
                source: unit.path.clone(),
                destination,
                staging: None,
                redundant_copy: false,
            });
        }
    }

    let destination_keys: HashSet<String> = entries.iter().map(|e| path_key(&e.destination)).collect();
    let mut known: HashSet<String> = destination_keys.clone();
    known.extend(entries.iter().map(|e| path_key(&e.source)));
    known.extend(claimed.keys().cloned());

    for entry in &mut entries {
        let source_key = path_key(&entry.source);
        // Either another entry wants this source's name, or the move only
        // changes case and would otherwise land on itself.
        if destination_keys.contains(&source_key) {
            let staging = staging_path(&entry.source, token, &known, fs)?;
            trace!(
                "{} staged via {}",
                entry.source.display(),
                staging.display()
            );
            known.insert(path_key(&staging));
            entry.staging = Some(staging);
        }
    }

    let plan = RenamePlan {
        token: token.to_string(),
        entries,
        no_ops,
        copy_no_ops,
    };
    debug!(
        "Plan built: {} moves ({} staged), {} already canonical, {} copies in place",
        plan.entries.len(),
        plan.staged_count(),
        plan.no_ops,
        plan.copy_no_ops
    );
    Ok(plan)
}

fn staging_path(
    source: &Path,
    token: &str,
    known: &HashSet<String>,
    fs: &dyn FileSystem,
) -> Result<PathBuf, PlanConflict> {
    let name = MediaName::from_path(source)
        .ok_or_else(|| PlanConflict::NoStagingName(source.to_path_buf()))?;
    let parent = source.parent().unwrap_or_else(|| Path::new(""));

    for attempt in 0..MAX_STAGING_ATTEMPTS {
        let attempt_token = if attempt == 0 {
            token.to_string()
        } else {
            format!("{}{}", token, attempt)
        };
        let candidate = parent.join(name.staging_file_name(&attempt_token));
        if !known.contains(&path_key(&candidate)) && !fs.exists(&candidate) {
            return Ok(candidate);
        }
    }
    Err(PlanConflict::NoStagingName(source.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use crate::model::{CaptureTime, UnitId};
    use chrono::NaiveDate;

    fn unit(id: usize, path: &str) -> CanonicalUnit {
        let name = MediaName::parse(Path::new(path).file_name().unwrap().to_str().unwrap()).unwrap();
        CanonicalUnit {
            id: UnitId(id),
            root_id: 0,
            path: PathBuf::from(path),
            prefix: name.prefix,
            original_index: name.index,
            index_width: name.width,
            extension: name.extension,
            capture_time: CaptureTime::fallback(
                NaiveDate::from_ymd_opt(2021, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, id as u32)
                    .unwrap(),
            ),
            digest: None,
            duplicates: Vec::new(),
        }
    }

    fn timelines(units: Vec<CanonicalUnit>) -> BTreeMap<String, Timeline> {
        let mut map = BTreeMap::new();
        map.insert(
            "DSC".to_string(),
            Timeline {
                prefix: "DSC".to_string(),
                width: 4,
                units,
            },
        );
        map
    }

    #[test]
    fn test_canonical_units_are_no_ops() {
        let plan = build_plan(
            &timelines(vec![unit(0, "/p/DSC_0001.jpg"), unit(1, "/p/DSC_0002.jpg")]),
            true,
            "tok",
            &LocalFs,
        )
        .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.no_ops, 2);
    }

    #[test]
    fn test_gap_is_closed_without_staging() {
        let plan = build_plan(
            &timelines(vec![unit(0, "/p/DSC_0001.jpg"), unit(1, "/p/DSC_0005.jpg")]),
            true,
            "tok",
            &LocalFs,
        )
        .unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].destination, PathBuf::from("/p/DSC_0002.jpg"));
        assert_eq!(plan.entries[0].staging, None);
    }

    #[test]
    fn test_swap_routes_occupied_sources_through_staging() {
        // chronologically DSC_0002 came first
        let plan = build_plan(
            &timelines(vec![unit(0, "/p/DSC_0002.jpg"), unit(1, "/p/DSC_0001.jpg")]),
            true,
            "tok",
            &LocalFs,
        )
        .unwrap();
        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.staged_count(), 2);
        assert_eq!(
            plan.entries[0].staging,
            Some(PathBuf::from("/p/DSC_0002~tok.jpg"))
        );
        assert_eq!(plan.entries[0].destination, PathBuf::from("/p/DSC_0001.jpg"));
    }

    #[test]
    fn test_suffix_is_dropped_and_chain_is_staged_only_where_needed() {
        let plan = build_plan(
            &timelines(vec![
                unit(0, "/p/DSC_0001.jpg"),
                unit(1, "/p/DSC_0001_1.jpg"),
                unit(2, "/p/DSC_0002.jpg"),
            ]),
            true,
            "tok",
            &LocalFs,
        )
        .unwrap();
        assert_eq!(plan.no_ops, 1);
        let by_source: HashMap<_, _> = plan
            .entries
            .iter()
            .map(|e| (e.source.clone(), e.clone()))
            .collect();
        let suffixed = &by_source[&PathBuf::from("/p/DSC_0001_1.jpg")];
        assert_eq!(suffixed.destination, PathBuf::from("/p/DSC_0002.jpg"));
        assert!(suffixed.staging.is_none());
        let displaced = &by_source[&PathBuf::from("/p/DSC_0002.jpg")];
        assert_eq!(displaced.destination, PathBuf::from("/p/DSC_0003.jpg"));
        assert!(displaced.staging.is_some());
    }

    #[test]
    fn test_case_only_move_is_staged() {
        let plan = build_plan(
            &timelines(vec![unit(0, "/p/DSC_0001.JPG")]),
            true,
            "tok",
            &LocalFs,
        )
        .unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].destination, PathBuf::from("/p/DSC_0001.jpg"));
        assert!(plan.entries[0].staging.is_some());
    }

    #[test]
    fn test_staging_name_avoids_known_paths() {
        let plan = build_plan(
            &timelines(vec![
                unit(0, "/p/DSC_0002.jpg"),
                unit(1, "/p/DSC_0002~tok.jpg"),
            ]),
            true,
            "tok",
            &LocalFs,
        )
        .unwrap();
        let staged: Vec<_> = plan.entries.iter().filter_map(|e| e.staging.clone()).collect();
        assert_eq!(staged, vec![PathBuf::from("/p/DSC_0002~tok1.jpg")]);
    }

    #[test]
    fn test_kept_copies_follow_their_representative() {
        let mut rep = unit(0, "/internal/DSC_0009.jpg");
        rep.duplicates = vec![
            PathBuf::from("/card/DSC_0009.jpg"),
            PathBuf::from("/internal/DSC_0009_1.jpg"),
        ];
        let plan = build_plan(&timelines(vec![rep.clone()]), true, "tok", &LocalFs).unwrap();
        let by_source: HashMap<_, _> = plan
            .entries
            .iter()
            .map(|e| (e.source.clone(), e.clone()))
            .collect();
        assert_eq!(plan.entries.len(), 3);
        assert_eq!(plan.unit_entries().count(), 1);
        assert_eq!(
            by_source[&PathBuf::from("/card/DSC_0009.jpg")].destination,
            PathBuf::from("/card/DSC_0001.jpg")
        );
        let beside = &by_source[&PathBuf::from("/internal/DSC_0009_1.jpg")];
        assert!(beside.redundant_copy);
        assert_eq!(beside.destination, PathBuf::from("/internal/DSC_0001_1.jpg"));

        let plan = build_plan(&timelines(vec![rep]), false, "tok", &LocalFs).unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert!(!plan.entries[0].redundant_copy);
    }

    #[test]
    fn test_copies_already_in_place_are_no_ops() {
        let mut rep = unit(0, "/internal/DSC_0001.jpg");
        rep.duplicates = vec![
            PathBuf::from("/card/DSC_0001.jpg"),
            PathBuf::from("/card/DSC_0001_1.jpg"),
        ];
        let plan = build_plan(&timelines(vec![rep]), true, "tok", &LocalFs).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.no_ops, 1);
        assert_eq!(plan.copy_no_ops, 2);
    }

    #[test]
    fn test_copy_moving_onto_another_source_is_staged() {
        let mut first = unit(0, "/p/DSC_0002.jpg");
        first.duplicates = vec![PathBuf::from("/card/DSC_0002.jpg")];
        let second = unit(1, "/card/DSC_0001.jpg");
        let plan = build_plan(&timelines(vec![first, second]), true, "tok", &LocalFs).unwrap();
        let copy = plan
            .entries
            .iter()
            .find(|e| e.source == Path::new("/card/DSC_0002.jpg"))
            .unwrap();
        assert_eq!(copy.destination, PathBuf::from("/card/DSC_0001.jpg"));
        assert!(copy.staging.is_some());
        let moved = plan
            .entries
            .iter()
            .find(|e| e.source == Path::new("/card/DSC_0001.jpg"))
            .unwrap();
        assert_eq!(moved.destination, PathBuf::from("/card/DSC_0002.jpg"));
        assert!(moved.staging.is_some());
    }

    #[test]
    fn test_duplicate_destination_is_fatal() {
        let mut mixed_case = timelines(vec![unit(0, "/p/DSC_0009.jpg")]);
        mixed_case.insert(
            "dsc".to_string(),
            Timeline {
                prefix: "dsc".to_string(),
                width: 4,
                units: vec![unit(1, "/p/DSC_0007.jpg")],
            },
        );
        let err = build_plan(&mixed_case, true, "tok", &LocalFs).unwrap_err();
        assert!(matches!(err, PlanConflict::DuplicateDestination { .. }));
    }

    #[test]
    fn test_directories_differing_in_case_do_not_conflict() {
        let mut rep = unit(0, "/x/Card/DSC_0001.jpg");
        rep.duplicates = vec![PathBuf::from("/x/card/DSC_0001.jpg")];
        let plan = build_plan(&timelines(vec![rep]), true, "tok", &LocalFs).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.no_ops, 1);
        assert_eq!(plan.copy_no_ops, 1);
        assert_eq!(
            path_key(Path::new("/x/Card/DSC_0001.JPG")),
            path_key(Path::new("/x/Card/dsc_0001.jpg"))
        );
        assert_ne!(
            path_key(Path::new("/x/Card/DSC_0001.jpg")),
            path_key(Path::new("/x/card/DSC_0001.jpg"))
        );
    }

    #[test]
    fn test_run_token_is_alphanumeric() {
        let token = run_token();
        assert!(!token.is_empty());
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(MediaName::parse(&format!("DSC_0001~{}.jpg", token)).is_some());
    }
}
