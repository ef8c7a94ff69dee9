use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/cam-reseq.log";

/// `TRACING_LEVEL` is either a level for this crate (`debug`) or a full
/// filter directive (`warn,cam_reseq::executor=trace`). Dependencies log at
/// `warn` unless a directive says otherwise.
fn filter_directive(level: Option<&str>) -> String {
    match level.map(str::trim).filter(|l| !l.is_empty()) {
        Some(directive) if directive.contains('=') || directive.contains(',') => {
            directive.to_string()
        }
        Some(level) => format!("warn,cam_reseq={}", level),
        None => "warn,cam_reseq=info".to_string(),
    }
}

/// Directory and file name of the log file. `LOG_FILE_PATH=off` (or empty)
/// turns file logging off.
fn log_file(path: Option<&str>) -> Option<(PathBuf, String)> {
    let path = match path.map(str::trim) {
        Some("") | Some("off") => return None,
        Some(path) => Path::new(path),
        None => Path::new(DEFAULT_LOG_FILE),
    };
    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Some((dir.to_path_buf(), file_name))
}

/// Pretty stdout logging plus an optional plain-text log file. Keep the
/// returned guard alive until exit so buffered file lines are flushed.
pub fn init_logger() -> Option<WorkerGuard> {
    let filter_layer = EnvFilter::new(filter_directive(env::var("TRACING_LEVEL").ok().as_deref()));

    let mut file_error = None;
    let mut log_path = None;
    let (file_layer, guard) = match log_file(env::var("LOG_FILE_PATH").ok().as_deref()) {
        Some((dir, file_name)) => {
            match RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(&file_name)
                .build(&dir)
            {
                Ok(appender) => {
                    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                    log_path = Some(dir.join(file_name));
                    let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
                    (Some(layer), Some(guard))
                }
                Err(err) => {
                    file_error = Some(format!("{}: {}", dir.join(file_name).display(), err));
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(file_layer)
        .with(filter_layer)
        .init();

    match (log_path, file_error) {
        (Some(path), _) => debug!("Logging to {}", path.display()),
        (None, Some(err)) => warn!("File logging disabled, cannot open {}", err),
        (None, None) => debug!("File logging disabled"),
    }

    guard
}
