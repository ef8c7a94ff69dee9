use crate::error::{Error, ScanWarning};
use crate::executor::ExecutionReport;
use crate::model::{EntryState, PlanEntry, Redundant, RenamePlan};
use csv::Writer;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Apply,
}

/// Headline numbers of a run. In a dry run `distinct_renamed` counts the
/// units the plan would move. `units` is `recognized` less the redundant
/// copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub scanned: usize,
    pub recognized: usize,
    pub units: usize,
    pub unrecognized: usize,
    pub duplicates_removed: usize,
    pub distinct_renamed: usize,
    pub copies_renamed: usize,
    pub no_ops: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct RunSummary {
    pub mode: RunMode,
    pub counts: RunCounts,
    pub collision_groups: usize,
    pub redundant: Vec<Redundant>,
    pub warnings: Vec<ScanWarning>,
    pub plan: RenamePlan,
    pub execution: Option<ExecutionReport>,
    /// Entries left short of their destination, with their last state.
    pub unresolved: Vec<(PlanEntry, EntryState)>,
}

impl RunSummary {
    /// `counts` carries the inventory numbers (`scanned`, `recognized`,
    /// `units`); the rest is derived from the plan and the execution.
    pub fn new(
        mode: RunMode,
        counts: RunCounts,
        collision_groups: usize,
        redundant: Vec<Redundant>,
        warnings: Vec<ScanWarning>,
        plan: RenamePlan,
        execution: Option<ExecutionReport>,
    ) -> Self {
        let unrecognized = warnings
            .iter()
            .filter(|w| matches!(w, ScanWarning::Unrecognized(_)))
            .count();

        let mut counts = RunCounts {
            unrecognized,
            no_ops: plan.no_ops,
            ..counts
        };
        let unresolved = match &execution {
            Some(report) => {
                let committed = |copy: bool| {
                    report
                        .outcomes
                        .iter()
                        .filter(|(e, s)| e.redundant_copy == copy && s.is_committed())
                        .count()
                };
                counts.distinct_renamed = committed(false);
                counts.copies_renamed = committed(true);
                counts.duplicates_removed = report.deleted.len();
                counts.failed = report.failed() + report.delete_failures.len();
                report.unresolved()
            }
            None => {
                counts.distinct_renamed = plan.unit_entries().count();
                counts.copies_renamed = plan.entries.len() - counts.distinct_renamed;
                Vec::new()
            }
        };

        Self {
            mode,
            counts,
            collision_groups,
            redundant,
            warnings,
            plan,
            execution,
            unresolved,
        }
    }

    /// True when nothing is left for a later run to finish.
    pub fn is_complete(&self) -> bool {
        match &self.execution {
            Some(report) => report.is_complete() && self.unresolved.is_empty(),
            None => self.plan.is_empty(),
        }
    }

    /// Final state of every plan entry: `planned` in a dry run.
    pub fn entry_states(&self) -> Vec<(&PlanEntry, String)> {
        match &self.execution {
            Some(report) => report
                .outcomes
                .iter()
                .map(|(entry, state)| (entry, state.label().to_string()))
                .collect(),
            None => self
                .plan
                .entries
                .iter()
                .map(|entry| (entry, "planned".to_string()))
                .collect(),
        }
    }
}

/// Write one row per plan entry, with its final or planned state.
pub fn write_plan_csv(summary: &RunSummary, file_path: &Path) -> Result<usize, Error> {
    let mut writer = Writer::from_path(file_path)?;

    writer.write_record([
        "unit",
        "kind",
        "source",
        "staging",
        "destination",
        "state",
    ])?;

    let mut rows = 0;
    for (entry, state) in summary.entry_states() {
        writer.write_record(&[
            entry.unit_id.to_string(),
            if entry.redundant_copy { "copy" } else { "unit" }.to_string(),
            entry.source.display().to_string(),
            entry
                .staging
                .as_ref()
                .map_or(String::new(), |p| p.display().to_string()),
            entry.destination.display().to_string(),
            state,
        ])?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

/// Redundant candidates grouped under their representative, sorted.
pub fn redundant_by_representative(redundant: &[Redundant]) -> Vec<(&Path, Vec<&Path>)> {
    let mut grouped: HashMap<&Path, Vec<&Path>> = HashMap::new();
    for r in redundant {
        grouped
            .entry(r.representative.as_path())
            .or_default()
            .push(r.path.as_path());
    }
    let mut grouped: Vec<_> = grouped.into_iter().collect();
    for (_, copies) in grouped.iter_mut() {
        copies.sort();
    }
    grouped.sort();
    grouped
}
