use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Roots are listed in priority order: the first root wins ties between
/// duplicates and sorts first among equal capture times.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl AppConfig {
    pub fn with_roots(mut self, roots: Vec<String>) -> Self {
        if !roots.is_empty() {
            self.roots = roots;
        }
        self
    }

    /// Worker count for hashing, metadata extraction and moves.
    pub fn worker_count(&self) -> usize {
        self.concurrency.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Configured roots with repeats and nested roots removed, paired with
    /// their priority (position in the configured list).
    pub fn prioritized_roots(&self) -> Vec<(u32, PathBuf)> {
        non_overlapping_directories(self.roots.clone())
            .into_iter()
            .filter_map(|root| {
                let priority = self.roots.iter().position(|r| *r == root)?;
                Some((priority as u32, PathBuf::from(root)))
            })
            .collect()
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("CAM_RESEQ")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("roots")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove directories that are subdirectories of other directories in the
/// list, and exact repeats. The first spelling of a repeat is kept.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);
        if result.iter().any(|kept| dir_path.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !Path::new(kept).starts_with(dir_path));
        result.push(dir);
    }

    result
}
