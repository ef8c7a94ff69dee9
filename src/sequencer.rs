use crate::model::{CanonicalUnit, Timeline};
use std::collections::BTreeMap;
use tracing::debug;

/// Partition units by prefix and order each partition chronologically.
///
/// The order is total (see [`CanonicalUnit::timeline_cmp`]), so identical
/// inputs always produce identical timelines regardless of scan order.
pub fn sequence(units: Vec<CanonicalUnit>) -> BTreeMap<String, Timeline> {
    let mut partitions: BTreeMap<String, Vec<CanonicalUnit>> = BTreeMap::new();
    for unit in units {
        partitions.entry(unit.prefix.clone()).or_default().push(unit);
    }

    partitions
        .into_iter()
        .map(|(prefix, mut units)| {
            units.sort_by(|a, b| a.timeline_cmp(b));
            let width = units.iter().map(|u| u.index_width).max().unwrap_or(4);
            debug!(
                "Timeline {}: {} units, index width {}",
                prefix,
                units.len(),
                width
            );
            let timeline = Timeline {
                prefix: prefix.clone(),
                width,
                units,
            };
            (prefix, timeline)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaptureTime, Provenance, UnitId};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn unit(id: usize, prefix: &str, index: u32, minute: u32, provenance: Provenance) -> CanonicalUnit {
        CanonicalUnit {
            id: UnitId(id),
            root_id: 0,
            path: PathBuf::from(format!("/photos/{}_{:04}.jpg", prefix, index)),
            prefix: prefix.to_string(),
            original_index: index,
            index_width: 4,
            extension: "jpg".to_string(),
            capture_time: CaptureTime {
                at: NaiveDate::from_ymd_opt(2022, 12, 24)
                    .unwrap()
                    .and_hms_opt(18, minute, 0)
                    .unwrap(),
                provenance,
            },
            digest: None,
            duplicates: Vec::new(),
        }
    }

    #[test]
    fn test_partitions_by_prefix() {
        let timelines = sequence(vec![
            unit(0, "DSC", 1, 5, Provenance::Metadata),
            unit(1, "MOV", 1, 1, Provenance::Fallback),
            unit(2, "DSC", 2, 3, Provenance::Metadata),
        ]);
        assert_eq!(timelines.len(), 2);
        let dsc: Vec<_> = timelines["DSC"].units.iter().map(|u| u.id).collect();
        assert_eq!(dsc, vec![UnitId(2), UnitId(0)]);
        assert_eq!(timelines["MOV"].units.len(), 1);
    }

    #[test]
    fn test_order_is_independent_of_input_order() {
        let units = vec![
            unit(0, "DSC", 7, 1, Provenance::Fallback),
            unit(1, "DSC", 3, 1, Provenance::Fallback),
            unit(2, "DSC", 9, 1, Provenance::Metadata),
            unit(3, "DSC", 1, 0, Provenance::Fallback),
        ];
        let mut reversed = units.clone();
        reversed.reverse();

        let forward: Vec<_> = sequence(units)["DSC"].units.iter().map(|u| u.id).collect();
        let backward: Vec<_> = sequence(reversed)["DSC"].units.iter().map(|u| u.id).collect();
        assert_eq!(forward, backward);
        assert_eq!(forward, vec![UnitId(3), UnitId(2), UnitId(1), UnitId(0)]);
    }

    #[test]
    fn test_width_is_widest_observed() {
        let mut wide = unit(0, "DSC", 1, 0, Provenance::Fallback);
        wide.index_width = 5;
        let timelines = sequence(vec![wide, unit(1, "DSC", 2, 1, Provenance::Fallback)]);
        assert_eq!(timelines["DSC"].width, 5);
    }
}
