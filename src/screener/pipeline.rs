use std::cmp::Ordering;

use crate::screener::criteria::{Direction, FilterCriteria, SortKey, SortSpec};
use crate::types::MetricRecord;

/// Filter then sort. Pure: the same inputs always give the same ordered output.
pub fn screen(records: &[MetricRecord], criteria: &FilterCriteria, sort: SortSpec) -> Vec<MetricRecord> {
    let mut visible = filter(records, criteria);
    sort_records(&mut visible, sort);
    visible
}

pub fn filter(records: &[MetricRecord], criteria: &FilterCriteria) -> Vec<MetricRecord> {
    records
        .iter()
        .filter(|r| criteria.matches(r))
        .cloned()
        .collect()
}

/// Stable sort. Missing or non-finite keys count as negative infinity, so they
/// land last in a descending sort and first in an ascending one.
pub fn sort_records(records: &mut [MetricRecord], sort: SortSpec) {
    records.sort_by(|a, b| {
        let ord = compare(a, b, sort.key);
        match sort.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    });
}

fn compare(a: &MetricRecord, b: &MetricRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Field(field) => {
            let va = field.value(a).unwrap_or(f64::NEG_INFINITY);
            let vb = field.value(b).unwrap_or(f64::NEG_INFINITY);
            va.total_cmp(&vb)
        }
        SortKey::Symbol => a.symbol.to_lowercase().cmp(&b.symbol.to_lowercase()),
    }
}
