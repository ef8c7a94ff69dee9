use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cam-reseq")]
#[command(about = "Renumber camera media into capture order", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build the rename plan for the roots; dry run unless --apply is given
    Reconcile {
        /// Roots in priority order; overrides the configured roots
        roots: Vec<String>,
        /// Execute the plan instead of only printing it
        #[arg(long)]
        apply: bool,
        /// Delete byte-identical copies instead of renaming them along
        #[arg(long)]
        delete_redundant: bool,
        /// Skip the deletion prompt
        #[arg(short, long)]
        yes: bool,
        /// Write the plan and entry states to a CSV file
        #[arg(long, value_name = "FILE")]
        plan_csv: Option<PathBuf>,
    },
    /// Copy every distinct capture into one directory under its canonical
    /// name, leaving the roots untouched; dry run unless --apply is given
    Export {
        /// Roots in priority order; overrides the configured roots
        roots: Vec<String>,
        /// Directory to copy into; created when missing
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,
        /// Copy the files instead of only printing the plan
        #[arg(long)]
        apply: bool,
    },
    /// Print inventory statistics without changing anything
    Analyze {
        /// Roots in priority order; overrides the configured roots
        roots: Vec<String>,
    },
    /// Print configuration values
    PrintConfig,
}
