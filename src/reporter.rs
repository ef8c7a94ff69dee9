use cam_reseq::model::{EntryState, PlanEntry};
use cam_reseq::ProgressReporter;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan: spinner (file count unknown upfront)
/// - Digest: bar over the collision-group members
/// - Moves: bar over every staging and commit move, created on the first one
/// - Export: bar over the files copied out
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
    moves: AtomicU64,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            moves: AtomicU64::new(0),
        }
    }

    fn spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars(TICK_CHARS),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn bar(template: &str, len: u64) -> ProgressBar {
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::with_template(template)
                .unwrap()
                .progress_chars("━╸─")
                .tick_chars(TICK_CHARS),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn println(&self, line: String) {
        let guard = self.bar.lock().unwrap();
        match guard.as_ref() {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }

    fn tick_move(&self) {
        let mut guard = self.bar.lock().unwrap();
        let pb = guard.get_or_insert_with(|| {
            Self::bar(
                "  {spinner:.cyan} Moving [{bar:30.cyan/dim}] {pos}/{len} moves",
                self.moves.load(Ordering::Relaxed),
            )
        });
        pb.inc(1);
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_started(&self, roots: usize) {
        self.set_bar(Self::spinner(&format!("Scanning {} root(s)...", roots)));
    }

    fn on_scan_progress(&self, files_found: usize, _current_path: &Path) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Scanning... {} files found", files_found));
        }
    }

    fn on_scan_complete(&self, recognized: usize, unrecognized: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Scan complete: {} media files, {} unrecognized in {:.2}s",
            "✓".green(),
            recognized,
            unrecognized,
            duration_secs
        );
    }

    fn on_digest_progress(&self, files_digested: usize, total_files: usize) {
        let mut guard = self.bar.lock().unwrap();
        let pb = guard.get_or_insert_with(|| {
            Self::bar(
                "  {spinner:.cyan} Digesting [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
                total_files as u64,
            )
        });
        pb.set_position(files_digested as u64);
        if files_digested >= total_files {
            pb.finish_and_clear();
            guard.take();
        }
    }

    fn on_plan_built(&self, entries: usize, staged: usize, no_ops: usize) {
        self.finish_bar();
        self.moves.store((entries + staged) as u64, Ordering::Relaxed);
        eprintln!(
            "  {} Plan: {} moves ({} via staging), {} already in place",
            "✓".green(),
            entries,
            staged,
            no_ops
        );
    }

    fn on_redundant_deleted(&self, path: &Path) {
        self.println(format!("  {} deleted {}", "-".red(), path.display()));
    }

    fn on_entry_staged(&self, _entry: &PlanEntry) {
        self.tick_move();
    }

    fn on_entry_committed(&self, _entry: &PlanEntry) {
        self.tick_move();
    }

    fn on_entry_failed(&self, entry: &PlanEntry, state: &EntryState) {
        self.println(format!(
            "  {} {} -> {}: {}",
            "✗".red(),
            entry.source.display(),
            entry.destination.display(),
            state
        ));
    }

    fn on_export_started(&self, files: usize) {
        self.set_bar(Self::bar(
            "  {spinner:.cyan} Copying [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
            files as u64,
        ));
    }

    fn on_file_exported(&self, _destination: &Path) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.inc(1);
        }
    }

    fn on_run_failed(&self, reason: &str) {
        self.finish_bar();
        eprintln!("  {} Run stopped: {}", "✗".red(), reason);
    }
}
