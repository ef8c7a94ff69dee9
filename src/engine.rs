use crate::analysis::{self, InventoryStats};
use crate::classifier;
use crate::config::AppConfig;
use crate::error::Error;
use crate::executor::{CancelToken, Executor};
use crate::export::{self, ExportSummary};
use crate::fs::{FileSystem, LocalFs};
use crate::hasher::{Blake3Digester, ContentDigester};
use crate::metadata::{ExifExtractor, MetadataExtractor};
use crate::model::{Redundant, RootId};
use crate::plan;
use crate::progress::ProgressReporter;
use crate::report::{RunCounts, RunMode, RunSummary};
use crate::scanner::{self, Inventory};
use crate::sequencer;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: RunMode,
    /// The user confirmed deleting redundant duplicates. A dry run with this
    /// set shows the plan the deletion would lead to.
    pub delete_redundant: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::DryRun,
            delete_redundant: false,
        }
    }
}

pub struct ReconcileEngine {
    config: AppConfig,
    fs: Arc<dyn FileSystem>,
    extractor: Arc<dyn MetadataExtractor>,
    digester: Arc<dyn ContentDigester>,
    cancel: CancelToken,
    token: Option<String>,
}

impl ReconcileEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            fs: Arc::new(LocalFs),
            extractor: Arc::new(ExifExtractor),
            digester: Arc::new(Blake3Digester),
            cancel: CancelToken::new(),
            token: None,
        }
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_digester(mut self, digester: Arc<dyn ContentDigester>) -> Self {
        self.digester = digester;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fix the staging token instead of deriving one from the clock.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn roots(&self) -> Result<Vec<(RootId, PathBuf)>, Error> {
        let roots = self.config.prioritized_roots();
        if roots.is_empty() {
            return Err(Error::Other("no roots configured".to_string()));
        }
        info!("Processing roots: {:?}", roots);
        Ok(roots)
    }

    fn pool(&self) -> Result<ThreadPool, Error> {
        let workers = self.config.worker_count();
        debug!("Using {} worker threads", workers);
        Ok(ThreadPoolBuilder::new().num_threads(workers).build()?)
    }

    fn scan(&self, roots: &[(RootId, PathBuf)], reporter: &dyn ProgressReporter) -> Inventory {
        let patterns = scanner::compile_ignore_patterns(&self.config.ignore_patterns);
        scanner::scan(
            self.fs.as_ref(),
            self.extractor.as_ref(),
            roots,
            &patterns,
            reporter,
        )
    }

    /// Run the whole pipeline:
    /// 1. Scan every root into media records
    /// 2. Group by (prefix, index) and collapse byte-identical copies
    /// 3. Order each prefix by capture time
    /// 4. Build the rename plan (fails before any mutation on a conflict)
    /// 5. In apply mode, execute it
    pub fn run(
        &self,
        options: &RunOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunSummary, Error> {
        let roots = self.roots()?;
        let pool = self.pool()?;
        pool.install(|| self.run_pipeline(&roots, options, reporter))
    }

    fn run_pipeline(
        &self,
        roots: &[(RootId, PathBuf)],
        options: &RunOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunSummary, Error> {
        let start = Instant::now();

        let inventory = self.scan(roots, reporter);
        let scanned = inventory.scanned;
        let recognized = inventory.records.len();
        let mut warnings = inventory.warnings;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let delete = options.delete_redundant;
        info!("Classifying {} media files...", recognized);
        let classification = classifier::classify(
            self.fs.as_ref(),
            self.digester.as_ref(),
            inventory.records,
            !delete,
            reporter,
        );
        warnings.extend(classification.warnings);

        let units = classification.units.len();
        let timelines = sequencer::sequence(classification.units);

        let token = self.token.clone().unwrap_or_else(plan::run_token);
        let plan = match plan::build_plan(&timelines, !delete, &token, self.fs.as_ref()) {
            Ok(plan) => plan,
            Err(conflict) => {
                error!("Plan conflict: {}", conflict);
                reporter.on_run_failed(&conflict.to_string());
                return Err(conflict.into());
            }
        };
        reporter.on_plan_built(plan.entries.len(), plan.staged_count(), plan.no_ops);
        info!(
            "Plan: {} moves ({} staged), {} already in place, {} redundant",
            plan.entries.len(),
            plan.staged_count(),
            plan.no_ops,
            classification.redundant.len()
        );

        let execution = match options.mode {
            RunMode::DryRun => None,
            RunMode::Apply => {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let to_delete: &[Redundant] = if delete {
                    classification.redundant.as_slice()
                } else {
                    &[]
                };
                let executor = Executor::new(self.fs.as_ref(), reporter)
                    .with_cancel_token(self.cancel.clone());
                Some(executor.execute(&plan, to_delete))
            }
        };

        debug!("Run finished in {:.2}s", start.elapsed().as_secs_f64());
        let counts = RunCounts {
            scanned,
            recognized,
            units,
            ..RunCounts::default()
        };
        Ok(RunSummary::new(
            options.mode,
            counts,
            classification.collision_groups,
            classification.redundant,
            warnings,
            plan,
            execution,
        ))
    }

    /// Copy-out mode: copy every canonical unit into `out_dir` under its
    /// canonical name, leaving the roots untouched. Redundant copies are not
    /// exported. A dry run only builds the export plan.
    pub fn export(
        &self,
        out_dir: &Path,
        mode: RunMode,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExportSummary, Error> {
        let roots = self.roots()?;
        if let Some((_, root)) = roots.iter().find(|(_, root)| out_dir.starts_with(root)) {
            return Err(Error::Other(format!(
                "output directory {} is inside root {}",
                out_dir.display(),
                root.display()
            )));
        }
        let pool = self.pool()?;
        pool.install(|| self.export_pipeline(&roots, out_dir, mode, reporter))
    }

    fn export_pipeline(
        &self,
        roots: &[(RootId, PathBuf)],
        out_dir: &Path,
        mode: RunMode,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExportSummary, Error> {
        let inventory = self.scan(roots, reporter);
        for warning in &inventory.warnings {
            warn!("{}", warning);
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let classification = classifier::classify(
            self.fs.as_ref(),
            self.digester.as_ref(),
            inventory.records,
            true,
            reporter,
        );
        for warning in &classification.warnings {
            warn!("{}", warning);
        }
        let timelines = sequencer::sequence(classification.units);

        let plan = match export::build_export_plan(&timelines, out_dir) {
            Ok(plan) => plan,
            Err(conflict) => {
                error!("Plan conflict: {}", conflict);
                reporter.on_run_failed(&conflict.to_string());
                return Err(conflict.into());
            }
        };
        info!(
            "Export plan: {} files into {}, {} redundant copies left out",
            plan.entries.len(),
            out_dir.display(),
            classification.redundant.len()
        );

        let report = match mode {
            RunMode::DryRun => None,
            RunMode::Apply => {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                self.fs.create_directory(out_dir)?;
                Some(export::export_files(
                    self.fs.as_ref(),
                    self.digester.as_ref(),
                    &plan,
                    reporter,
                    &self.cancel,
                ))
            }
        };

        Ok(ExportSummary {
            mode,
            scanned: inventory.scanned,
            redundant: classification.redundant.len(),
            plan,
            report,
        })
    }

    /// Scan only and report inventory statistics.
    pub fn analyze(&self, reporter: &dyn ProgressReporter) -> Result<InventoryStats, Error> {
        let roots = self.roots()?;
        let pool = self.pool()?;
        let inventory = pool.install(|| self.scan(&roots, reporter));
        Ok(analysis::analyze_inventory(&inventory, self.fs.as_ref()))
    }
}
