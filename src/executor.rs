//! Applies a rename plan: the only part of the crate that mutates the
//! filesystem.
//!
//! Phase 0 deletes confirmed redundant duplicates, phase 1 moves occupied
//! sources to their staging names, phase 2 moves everything to its final
//! name. Each phase finishes completely before the next starts. The first
//! failed move halts the run; nothing is rolled back, and re-running the
//! whole pipeline picks up where this run stopped.

use crate::error::DeleteError;
use crate::fs::FileSystem;
use crate::model::{EntryState, PlanEntry, Redundant, RenamePlan};
use crate::progress::ProgressReporter;
use dashmap::DashMap;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Cooperative cancellation, honored between moves only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub outcomes: Vec<(PlanEntry, EntryState)>,
    pub deleted: Vec<PathBuf>,
    pub delete_failures: Vec<DeleteError>,
    pub halted: bool,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|(_, s)| s.is_committed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, s)| matches!(s, EntryState::Failed { .. }))
            .count()
    }

    /// Entries that did not reach their destination: the checkpoint a later
    /// run will finish.
    pub fn unresolved(&self) -> Vec<(PlanEntry, EntryState)> {
        self.outcomes
            .iter()
            .filter(|(_, s)| !s.is_committed())
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        !self.halted && !self.cancelled && self.delete_failures.is_empty()
    }
}

pub struct Executor<'a> {
    fs: &'a dyn FileSystem,
    reporter: &'a dyn ProgressReporter,
    cancel: CancelToken,
}

impl<'a> Executor<'a> {
    pub fn new(fs: &'a dyn FileSystem, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            fs,
            reporter,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the plan on the current rayon pool. `to_delete` must only contain
    /// redundant files the user confirmed for deletion.
    pub fn execute(&self, plan: &RenamePlan, to_delete: &[Redundant]) -> ExecutionReport {
        let start = Instant::now();
        let states: DashMap<usize, EntryState> = (0..plan.entries.len())
            .map(|i| (i, EntryState::Pending))
            .collect();
        let halted = AtomicBool::new(false);
        let mut report = ExecutionReport::default();

        if !to_delete.is_empty() {
            info!("Deleting {} redundant duplicates...", to_delete.len());
            let (deleted, failures) = self.delete_redundant(to_delete);
            report.deleted = deleted;
            if !failures.is_empty() {
                halted.store(true, Ordering::SeqCst);
            }
            report.delete_failures = failures;
        }

        if !self.should_stop(&halted) {
            info!("Staging {} entries...", plan.staged_count());
            plan.entries
                .par_iter()
                .enumerate()
                .filter(|(_, entry)| entry.needs_staging())
                .for_each(|(i, entry)| self.stage(i, entry, &states, &halted));
        }

        if !self.should_stop(&halted) {
            info!("Committing {} entries...", plan.entries.len());
            plan.entries
                .par_iter()
                .enumerate()
                .for_each(|(i, entry)| self.commit(i, entry, &states, &halted));
        }

        report.halted = halted.load(Ordering::SeqCst);
        report.cancelled = self.cancel.is_cancelled();
        report.outcomes = plan
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let state = states
                    .remove(&i)
                    .map(|(_, state)| state)
                    .unwrap_or(EntryState::Pending);
                (entry.clone(), state)
            })
            .collect();

        if report.halted {
            self.reporter.on_run_failed("a filesystem operation failed; re-run to resume");
        } else if report.cancelled {
            self.reporter.on_run_failed("cancelled");
        }
        debug!(
            "Execution finished in {:.2}s: {} committed, {} failed, {} deleted",
            start.elapsed().as_secs_f64(),
            report.committed(),
            report.failed(),
            report.deleted.len(),
        );
        report
    }

    /// Delete confirmed redundant files, stopping at the first failure.
    pub fn delete_redundant(&self, to_delete: &[Redundant]) -> (Vec<PathBuf>, Vec<DeleteError>) {
        let mut deleted = Vec::new();
        for redundant in to_delete {
            if self.cancel.is_cancelled() {
                break;
            }
            // never remove the last copy
            let refusal = if redundant.path == redundant.representative {
                Some("it is its own representative".to_string())
            } else if !self.fs.exists(&redundant.representative) {
                Some(format!(
                    "representative {} is missing",
                    redundant.representative.display()
                ))
            } else {
                None
            };
            if let Some(reason) = refusal {
                let failure = DeleteError {
                    path: redundant.path.clone(),
                    reason,
                };
                error!("{}", failure);
                return (deleted, vec![failure]);
            }
            match self.fs.delete_entry(&redundant.path) {
                Ok(()) => {
                    debug!("Deleted {}", redundant.path.display());
                    self.reporter.on_redundant_deleted(&redundant.path);
                    deleted.push(redundant.path.clone());
                }
                Err(err) => {
                    error!("{}", err);
                    return (deleted, vec![err]);
                }
            }
        }
        (deleted, Vec::new())
    }

    fn should_stop(&self, halted: &AtomicBool) -> bool {
        halted.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    fn stage(
        &self,
        i: usize,
        entry: &PlanEntry,
        states: &DashMap<usize, EntryState>,
        halted: &AtomicBool,
    ) {
        if self.should_stop(halted) {
            return;
        }
        let Some(staging) = entry.staging.as_deref() else {
            return;
        };
        match self.checked_move(&entry.source, staging) {
            Ok(()) => {
                states.insert(i, EntryState::Staged);
                self.reporter.on_entry_staged(entry);
            }
            Err(reason) => self.fail(i, entry, reason, &entry.source, states, halted),
        }
    }

    fn commit(
        &self,
        i: usize,
        entry: &PlanEntry,
        states: &DashMap<usize, EntryState>,
        halted: &AtomicBool,
    ) {
        if self.should_stop(halted) {
            return;
        }
        let from = entry.commit_source();
        match self.checked_move(from, &entry.destination) {
            Ok(()) => {
                states.insert(i, EntryState::Committed);
                self.reporter.on_entry_committed(entry);
            }
            Err(reason) => self.fail(i, entry, reason, from, states, halted),
        }
    }

    /// Move without ever replacing an existing file.
    fn checked_move(&self, from: &Path, to: &Path) -> Result<(), String> {
        if self.fs.exists(to) {
            return Err(format!("{} already exists", to.display()));
        }
        self.fs.move_entry(from, to).map_err(|err| err.reason)
    }

    fn fail(
        &self,
        i: usize,
        entry: &PlanEntry,
        reason: String,
        resting_at: &Path,
        states: &DashMap<usize, EntryState>,
        halted: &AtomicBool,
    ) {
        warn!(
            "Failed to move {} to {}: {}",
            resting_at.display(),
            entry.destination.display(),
            reason
        );
        let state = EntryState::Failed {
            reason,
            resting_at: resting_at.to_path_buf(),
        };
        self.reporter.on_entry_failed(entry, &state);
        states.insert(i, state);
        halted.store(true, Ordering::SeqCst);
    }
}
