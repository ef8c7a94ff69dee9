mod cli;
mod logging;
mod reporter;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Result;
use cam_reseq::export::ExportState;
use cam_reseq::report::{self, RunMode, RunSummary};
use cam_reseq::{AppConfig, ReconcileEngine, RunOptions};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use colored::*;
use dotenv::dotenv;
use reporter::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match cam_reseq::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let ok = match args.command {
        Some(Commands::Reconcile {
            roots,
            apply,
            delete_redundant,
            yes,
            plan_csv,
        }) => {
            let config = config.with_roots(roots);
            match run_reconcile(config, apply, delete_redundant, yes, plan_csv) {
                Ok(complete) => complete,
                Err(err) => {
                    error!("Error: {}", err);
                    false
                }
            }
        }
        Some(Commands::Export { roots, out, apply }) => {
            match run_export(config.with_roots(roots), &out, apply) {
                Ok(complete) => complete,
                Err(err) => {
                    error!("Error: {}", err);
                    false
                }
            }
        }
        Some(Commands::Analyze { roots }) => match run_analyze(config.with_roots(roots)) {
            Ok(()) => true,
            Err(err) => {
                error!("Error: {}", err);
                false
            }
        },
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            true
        }
        None => {
            let _ = Cli::command().print_long_help();
            true
        }
    };

    if !ok {
        process::exit(1);
    }
}

fn run_reconcile(
    config: AppConfig,
    apply: bool,
    delete_redundant: bool,
    yes: bool,
    plan_csv: Option<PathBuf>,
) -> Result<bool> {
    let engine = ReconcileEngine::new(config);
    let reporter = CliReporter::new();

    let mut options = RunOptions {
        mode: if apply { RunMode::Apply } else { RunMode::DryRun },
        delete_redundant,
    };

    if apply && delete_redundant && !yes {
        let preview = engine.run(
            &RunOptions {
                mode: RunMode::DryRun,
                delete_redundant: true,
            },
            &reporter,
        )?;
        print_redundant(&preview);
        options.delete_redundant = !preview.redundant.is_empty()
            && prompt_confirm(
                &format!(
                    "Delete {} redundant copies listed above?",
                    preview.redundant.len()
                ),
                Some(false),
            )?;
        if !options.delete_redundant {
            info!("Keeping redundant copies; they will be renamed with their originals");
        }
    }

    let summary = engine.run(&options, &reporter)?;

    if let Some(path) = plan_csv {
        let rows = report::write_plan_csv(&summary, &path)?;
        info!("Wrote {} plan rows to {}", rows, path.display());
    }

    print_summary(&summary);
    Ok(summary.mode == RunMode::DryRun || summary.is_complete())
}

fn run_export(config: AppConfig, out: &Path, apply: bool) -> Result<bool> {
    let engine = ReconcileEngine::new(config);
    let mode = if apply { RunMode::Apply } else { RunMode::DryRun };
    let summary = engine.export(out, mode, &CliReporter::new())?;

    match &summary.report {
        None => {
            for entry in &summary.plan.entries {
                println!(
                    "  {} {} {}",
                    entry.source.display(),
                    "=>".cyan(),
                    entry.destination.display()
                );
            }
            println!();
            info!(
                "{} files to copy into {}, {} redundant copies left out",
                format!("{}", summary.plan.entries.len()).green(),
                out.display(),
                summary.redundant
            );
            if !summary.plan.entries.is_empty() {
                info!("Dry run: pass --apply to copy the files");
            }
        }
        Some(report) => {
            for (entry, state) in &report.outcomes {
                if !matches!(state, ExportState::Copied | ExportState::AlreadyPresent) {
                    error!(
                        "{} -> {}: {}",
                        entry.source.display(),
                        entry.destination.display(),
                        state
                    );
                }
            }
            println!();
            info!(
                "{} copied, {} already present, {} failed, {} redundant copies left out",
                format!("{}", report.copied()).green(),
                report.already_present(),
                format!("{}", report.failed()).red(),
                summary.redundant
            );
        }
    }
    Ok(summary.is_complete())
}

fn run_analyze(config: AppConfig) -> Result<()> {
    let engine = ReconcileEngine::new(config);
    let stats = engine.analyze(&CliReporter::new())?;

    println!();
    info!(
        "{} files scanned, {} media files",
        format!("{}", stats.scanned).cyan(),
        format!("{}", stats.recognized).cyan(),
    );
    for (label, extreme) in [
        ("Earliest modified", &stats.earliest_modified),
        ("Latest modified", &stats.latest_modified),
        ("Earliest capture", &stats.earliest_capture),
        ("Latest capture", &stats.latest_capture),
    ] {
        if let Some(extreme) = extreme {
            info!("{}: {} ({})", label, extreme.at, extreme.path.display());
        }
    }
    if stats.fallback_times > 0 {
        warn!(
            "{} files have no capture metadata and are ordered by modification time",
            format!("{}", stats.fallback_times).yellow()
        );
    }
    if let Some((suffix, path)) = &stats.max_collision_suffix {
        info!("Largest collision suffix: _{} ({})", suffix, path.display());
    }
    for (prefix, p) in &stats.prefixes {
        info!(
            "{}: {} files, index {}..{} (width {}), {} suffixed, {} staging leftovers",
            prefix.green(),
            p.files,
            p.min_index,
            p.max_index,
            p.max_width,
            p.suffixed,
            p.staged_leftovers
        );
    }
    if !stats.unusual_names.is_empty() {
        warn!("{} unusual file names:", stats.unusual_names.len());
        for path in &stats.unusual_names {
            println!("  {}", path.display());
        }
    }
    Ok(())
}

fn print_redundant(summary: &RunSummary) {
    for (representative, copies) in report::redundant_by_representative(&summary.redundant) {
        println!("{}", representative.display().to_string().green());
        for copy in copies {
            println!("  {} {}", "=".red(), copy.display());
        }
    }
}

fn print_summary(summary: &RunSummary) {
    for warning in &summary.warnings {
        warn!("{}", warning);
    }

    if summary.mode == RunMode::DryRun {
        for entry in &summary.plan.entries {
            let arrow = if entry.needs_staging() { "~>" } else { "->" };
            println!(
                "  {} {} {}",
                entry.source.display(),
                arrow.cyan(),
                entry.destination.display()
            );
        }
        if !summary.redundant.is_empty() {
            println!("Redundant copies:");
            print_redundant(summary);
        }
    }

    for (entry, state) in &summary.unresolved {
        error!(
            "{} -> {}: {}",
            entry.source.display(),
            entry.destination.display(),
            state
        );
    }

    let c = summary.counts;
    println!();
    info!(
        "{} scanned, {} media files in {} units, {} unrecognized, {} collision groups",
        format!("{}", c.scanned).cyan(),
        c.recognized,
        c.units,
        format!("{}", c.unrecognized).yellow(),
        format!("{}", summary.collision_groups).cyan(),
    );
    info!(
        "{} {}, {} copies, {} already in place, {} duplicates removed, {} failed",
        format!("{}", c.distinct_renamed).green(),
        if summary.mode == RunMode::DryRun {
            "to rename"
        } else {
            "renamed"
        },
        format!("{}", c.copies_renamed).green(),
        c.no_ops,
        format!("{}", c.duplicates_removed).red(),
        format!("{}", c.failed).red(),
    );
    if summary.mode == RunMode::DryRun && !summary.plan.is_empty() {
        info!("Dry run: pass --apply to execute the plan");
    } else if summary.mode == RunMode::Apply && !summary.is_complete() {
        warn!("Run did not complete; re-run to resume");
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
