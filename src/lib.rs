pub mod analysis;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod export;
pub mod fs;
pub mod hasher;
pub mod metadata;
pub mod model;
pub mod plan;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod sequencer;

pub use config::AppConfig;
pub use engine::{ReconcileEngine, RunOptions};
pub use error::Error;
pub use executor::CancelToken;
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{RunCounts, RunMode, RunSummary};
