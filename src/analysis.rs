//! Read-only statistics over an inventory, for looking at a card before
//! reconciling it.

use crate::fs::FileSystem;
use crate::metadata::local_time;
use crate::model::{MediaRecord, Provenance};
use crate::scanner::Inventory;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// A time paired with the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extreme {
    pub at: NaiveDateTime,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixStats {
    pub files: usize,
    pub min_index: u32,
    pub max_index: u32,
    pub max_width: usize,
    pub suffixed: usize,
    pub staged_leftovers: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InventoryStats {
    pub scanned: usize,
    pub recognized: usize,
    pub earliest_modified: Option<Extreme>,
    pub latest_modified: Option<Extreme>,
    pub earliest_capture: Option<Extreme>,
    pub latest_capture: Option<Extreme>,
    /// Files whose capture time had to fall back to the modification time.
    pub fallback_times: usize,
    pub max_collision_suffix: Option<(u32, PathBuf)>,
    pub prefixes: BTreeMap<String, PrefixStats>,
    pub unusual_names: Vec<PathBuf>,
}

fn keep_min(slot: &mut Option<Extreme>, at: NaiveDateTime, path: &PathBuf) {
    if slot.as_ref().map_or(true, |e| at < e.at) {
        *slot = Some(Extreme {
            at,
            path: path.clone(),
        });
    }
}

fn keep_max(slot: &mut Option<Extreme>, at: NaiveDateTime, path: &PathBuf) {
    if slot.as_ref().map_or(true, |e| at > e.at) {
        *slot = Some(Extreme {
            at,
            path: path.clone(),
        });
    }
}

fn add_record(stats: &mut InventoryStats, record: &MediaRecord) {
    let prefix = stats
        .prefixes
        .entry(record.prefix.clone())
        .or_insert_with(|| PrefixStats {
            min_index: record.original_index,
            max_index: record.original_index,
            ..PrefixStats::default()
        });
    prefix.files += 1;
    prefix.min_index = prefix.min_index.min(record.original_index);
    prefix.max_index = prefix.max_index.max(record.original_index);
    prefix.max_width = prefix.max_width.max(record.index_width);
    if record.collision_suffix.is_some() {
        prefix.suffixed += 1;
    }
    if record.staged {
        prefix.staged_leftovers += 1;
    }

    if let Some(suffix) = record.collision_suffix {
        if stats
            .max_collision_suffix
            .as_ref()
            .map_or(true, |(max, _)| suffix > *max)
        {
            stats.max_collision_suffix = Some((suffix, record.original_path.clone()));
        }
    }

    let capture = record.capture_time;
    if capture.provenance == Provenance::Fallback {
        stats.fallback_times += 1;
    }
    keep_min(&mut stats.earliest_capture, capture.at, &record.original_path);
    keep_max(&mut stats.latest_capture, capture.at, &record.original_path);
}

/// Summarize an inventory. Modification times are read again through `fs`
/// because records only keep the one time used for ordering.
pub fn analyze_inventory(inventory: &Inventory, fs: &dyn FileSystem) -> InventoryStats {
    let mut stats = InventoryStats {
        scanned: inventory.scanned,
        recognized: inventory.records.len(),
        unusual_names: inventory.unrecognized().cloned().collect(),
        ..InventoryStats::default()
    };
    stats.unusual_names.sort();

    for record in &inventory.records {
        add_record(&mut stats, record);
        match fs.modified_time(&record.original_path) {
            Ok(modified) => {
                let at = local_time(modified);
                keep_min(&mut stats.earliest_modified, at, &record.original_path);
                keep_max(&mut stats.latest_modified, at, &record.original_path);
            }
            Err(err) => debug!(
                "No modification time for {}: {}",
                record.original_path.display(),
                err
            ),
        }
    }
    stats
}
