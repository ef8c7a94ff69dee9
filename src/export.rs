//! Copy-out mode: instead of renaming in place, every canonical unit is
//! copied into one output directory under its canonical name. Sources are
//! never touched and redundant copies are simply not exported.

use crate::classifier::digest_file;
use crate::error::PlanConflict;
use crate::executor::CancelToken;
use crate::fs::FileSystem;
use crate::hasher::ContentDigester;
use crate::model::{Timeline, UnitId};
use crate::plan::path_key;
use crate::progress::ProgressReporter;
use crate::report::RunMode;
use crate::scanner::MediaName;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub unit_id: UnitId,
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub out_dir: PathBuf,
    pub entries: Vec<ExportEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportState {
    Copied,
    /// The destination already holds the same bytes, from an earlier export.
    AlreadyPresent,
    Failed { reason: String },
    /// Not attempted because the export was cancelled.
    Skipped,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copied => f.write_str("copied"),
            Self::AlreadyPresent => f.write_str("already present"),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub outcomes: Vec<(ExportEntry, ExportState)>,
    pub cancelled: bool,
}

impl ExportReport {
    fn count(&self, wanted: fn(&ExportState) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, s)| wanted(s)).count()
    }

    pub fn copied(&self) -> usize {
        self.count(|s| *s == ExportState::Copied)
    }

    pub fn already_present(&self) -> usize {
        self.count(|s| *s == ExportState::AlreadyPresent)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ExportState::Failed { .. }))
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self
                .outcomes
                .iter()
                .all(|(_, s)| matches!(s, ExportState::Copied | ExportState::AlreadyPresent))
    }
}

/// Result of `ReconcileEngine::export`. `report` is `None` in a dry run.
#[derive(Debug)]
pub struct ExportSummary {
    pub mode: RunMode,
    pub scanned: usize,
    pub redundant: usize,
    pub plan: ExportPlan,
    pub report: Option<ExportReport>,
}

impl ExportSummary {
    pub fn is_complete(&self) -> bool {
        self.report.as_ref().map_or(true, ExportReport::is_complete)
    }
}

/// One entry per canonical unit, in timeline order, named as the unit would
/// be named in place. Destinations are collision-checked with the same
/// case-folded keys as the rename plan.
pub fn build_export_plan(
    timelines: &BTreeMap<String, Timeline>,
    out_dir: &Path,
) -> Result<ExportPlan, PlanConflict> {
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    let mut entries = Vec::new();

    for timeline in timelines.values() {
        for (position, unit) in timeline.units.iter().enumerate() {
            let name = MediaName::canonical_file_name(
                &unit.prefix,
                position as u32 + 1,
                timeline.width,
                &unit.extension,
            );
            let destination = out_dir.join(name);
            if let Some(first) = claimed.insert(path_key(&destination), unit.path.clone()) {
                return Err(PlanConflict::DuplicateDestination {
                    destination,
                    first,
                    second: unit.path.clone(),
                });
            }
            entries.push(ExportEntry {
                unit_id: unit.id,
                source: unit.path.clone(),
                destination,
            });
        }
    }

    debug!("Export plan: {} files into {}", entries.len(), out_dir.display());
    Ok(ExportPlan {
        out_dir: out_dir.to_path_buf(),
        entries,
    })
}

/// Copy every entry on the current rayon pool. A destination that already
/// exists is never overwritten: it counts as done when it holds the same
/// bytes and as a failure otherwise. Failures do not stop the other copies.
pub fn export_files(
    fs: &dyn FileSystem,
    digester: &dyn ContentDigester,
    plan: &ExportPlan,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> ExportReport {
    let start = Instant::now();
    info!(
        "Copying {} files into {}...",
        plan.entries.len(),
        plan.out_dir.display()
    );
    reporter.on_export_started(plan.entries.len());

    let outcomes: Vec<(ExportEntry, ExportState)> = plan
        .entries
        .par_iter()
        .map(|entry| {
            if cancel.is_cancelled() {
                return (entry.clone(), ExportState::Skipped);
            }
            let state = export_one(fs, digester, entry);
            match &state {
                ExportState::Failed { reason } => error!(
                    "{} -> {}: {}",
                    entry.source.display(),
                    entry.destination.display(),
                    reason
                ),
                _ => reporter.on_file_exported(&entry.destination),
            }
            (entry.clone(), state)
        })
        .collect();

    let report = ExportReport {
        outcomes,
        cancelled: cancel.is_cancelled(),
    };
    if report.cancelled {
        warn!("Export cancelled");
    }
    debug!(
        "Export finished in {:.2}s: {} copied, {} already present, {} failed",
        start.elapsed().as_secs_f64(),
        report.copied(),
        report.already_present(),
        report.failed()
    );
    report
}

fn export_one(fs: &dyn FileSystem, digester: &dyn ContentDigester, entry: &ExportEntry) -> ExportState {
    if fs.exists(&entry.destination) {
        let same = digest_file(fs, digester, &entry.source)
            .and_then(|source| Ok(source == digest_file(fs, digester, &entry.destination)?));
        return match same {
            Ok(true) => ExportState::AlreadyPresent,
            Ok(false) => ExportState::Failed {
                reason: "destination exists with different content".to_string(),
            },
            Err(err) => ExportState::Failed {
                reason: err.to_string(),
            },
        };
    }
    match fs.copy_entry(&entry.source, &entry.destination) {
        Ok(()) => ExportState::Copied,
        Err(err) => ExportState::Failed { reason: err.reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;
    use crate::hasher::Blake3Digester;
    use crate::model::{CanonicalUnit, CaptureTime};
    use crate::progress::SilentReporter;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn unit(id: usize, path: &Path, prefix: &str, extension: &str) -> CanonicalUnit {
        CanonicalUnit {
            id: UnitId(id),
            root_id: 0,
            path: path.to_path_buf(),
            prefix: prefix.to_string(),
            original_index: 9,
            index_width: 4,
            extension: extension.to_string(),
            capture_time: CaptureTime::fallback(
                NaiveDate::from_ymd_opt(2022, 5, 1)
                    .unwrap()
                    .and_hms_opt(8, 0, id as u32)
                    .unwrap(),
            ),
            digest: None,
            duplicates: Vec::new(),
        }
    }

    fn timelines(units: Vec<(&str, Vec<CanonicalUnit>)>) -> BTreeMap<String, Timeline> {
        units
            .into_iter()
            .map(|(prefix, units)| {
                (
                    prefix.to_string(),
                    Timeline {
                        prefix: prefix.to_string(),
                        width: 4,
                        units,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_plan_names_units_by_position() {
        let out = Path::new("/out");
        let plan = build_export_plan(
            &timelines(vec![
                (
                    "DSC",
                    vec![
                        unit(0, Path::new("/card/DSC_0009.jpg"), "DSC", "jpg"),
                        unit(1, Path::new("/internal/DSC_0002.jpg"), "DSC", "jpg"),
                    ],
                ),
                ("MOV", vec![unit(2, Path::new("/card/MOV_0040.mp4"), "MOV", "mp4")]),
            ]),
            out,
        )
        .unwrap();
        let destinations: Vec<_> = plan.entries.iter().map(|e| e.destination.clone()).collect();
        assert_eq!(
            destinations,
            vec![
                out.join("DSC_0001.jpg"),
                out.join("DSC_0002.jpg"),
                out.join("MOV_0001.mp4"),
            ]
        );
    }

    #[test]
    fn test_plan_rejects_case_folded_clash() {
        let err = build_export_plan(
            &timelines(vec![
                ("DSC", vec![unit(0, Path::new("/a/DSC_0001.jpg"), "DSC", "jpg")]),
                ("dsc", vec![unit(1, Path::new("/b/dsc_0001.jpg"), "dsc", "jpg")]),
            ]),
            Path::new("/out"),
        )
        .unwrap_err();
        assert!(matches!(err, PlanConflict::DuplicateDestination { .. }));
    }

    #[test]
    fn test_export_copies_and_keeps_existing_files() {
        let tmp = tempdir().unwrap();
        let card = tmp.path().join("card");
        let out = tmp.path().join("out");
        fs::create_dir_all(&card).unwrap();
        fs::create_dir_all(&out).unwrap();
        fs::write(card.join("DSC_0007.jpg"), b"first").unwrap();
        fs::write(card.join("DSC_0003.jpg"), b"second").unwrap();
        fs::write(card.join("DSC_0005.jpg"), b"third").unwrap();
        // left by an earlier export, and an unrelated file in the way
        fs::write(out.join("DSC_0001.jpg"), b"first").unwrap();
        fs::write(out.join("DSC_0003.jpg"), b"someone else's").unwrap();

        let plan = build_export_plan(
            &timelines(vec![(
                "DSC",
                vec![
                    unit(0, &card.join("DSC_0007.jpg"), "DSC", "jpg"),
                    unit(1, &card.join("DSC_0003.jpg"), "DSC", "jpg"),
                    unit(2, &card.join("DSC_0005.jpg"), "DSC", "jpg"),
                ],
            )]),
            &out,
        )
        .unwrap();
        let report = export_files(
            &LocalFs,
            &Blake3Digester,
            &plan,
            &SilentReporter,
            &CancelToken::new(),
        );

        assert_eq!(report.already_present(), 1);
        assert_eq!(report.copied(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_complete());
        assert_eq!(fs::read(out.join("DSC_0002.jpg")).unwrap(), b"second");
        assert_eq!(fs::read(out.join("DSC_0003.jpg")).unwrap(), b"someone else's");
        assert!(card.join("DSC_0007.jpg").exists());
    }

    #[test]
    fn test_cancelled_export_copies_nothing() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("DSC_0004.jpg"), b"x").unwrap();
        let out = tmp.path().join("out");
        let plan = build_export_plan(
            &timelines(vec![(
                "DSC",
                vec![unit(0, &tmp.path().join("DSC_0004.jpg"), "DSC", "jpg")],
            )]),
            &out,
        )
        .unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = export_files(&LocalFs, &Blake3Digester, &plan, &SilentReporter, &cancel);
        assert!(report.cancelled);
        assert_eq!(report.outcomes[0].1, ExportState::Skipped);
        assert!(!out.join("DSC_0001.jpg").exists());
    }
}
