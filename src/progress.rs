use crate::model::{EntryState, PlanEntry};
use std::path::Path;

/// Trait for reporting reconciliation progress.
///
/// CLI implements with tracing/indicatif; tests usually pass `SilentReporter`.
/// All methods have default no-op implementations and must return quickly:
/// the pipeline calls them inline, sometimes from worker threads.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_started(&self, _roots: usize) {}
    fn on_scan_progress(&self, _files_found: usize, _current_path: &Path) {}
    fn on_scan_complete(&self, _recognized: usize, _unrecognized: usize, _duration_secs: f64) {}
    fn on_digest_progress(&self, _files_digested: usize, _total_files: usize) {}
    fn on_group_resolved(&self, _prefix: &str, _index: u32, _units: usize, _redundant: usize) {}
    fn on_plan_built(&self, _entries: usize, _staged: usize, _no_ops: usize) {}
    fn on_redundant_deleted(&self, _path: &Path) {}
    fn on_entry_staged(&self, _entry: &PlanEntry) {}
    fn on_entry_committed(&self, _entry: &PlanEntry) {}
    fn on_entry_failed(&self, _entry: &PlanEntry, _state: &EntryState) {}
    fn on_export_started(&self, _files: usize) {}
    fn on_file_exported(&self, _destination: &Path) {}
    fn on_run_failed(&self, _reason: &str) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
