use std::collections::BTreeMap;

use super::models::MetricObservation;

/// Picks the observation representing current state for each metric.
///
/// The newest `record_date` wins; among records sharing that date the one
/// appearing later in `records` wins, matching the aligner's duplicate policy.
pub fn select_latest(records: &[MetricObservation]) -> BTreeMap<String, MetricObservation> {
    let mut latest: BTreeMap<String, &MetricObservation> = BTreeMap::new();
    for record in records {
        let replace = latest
            .get(&record.metric_id)
            .map_or(true, |current| current.record_date <= record.record_date);
        if replace {
            latest.insert(record.metric_id.clone(), record);
        }
    }
    latest
        .into_iter()
        .map(|(metric_id, record)| (metric_id, record.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(metric: &str, y: i32, m: u32, d: u32, value: f64) -> MetricObservation {
        MetricObservation::new(metric, "s1", NaiveDate::from_ymd_opt(y, m, d).unwrap(), value)
    }

    #[test]
    fn same_date_duplicates_keep_last_inserted() {
        let records = vec![obs("m1", 2024, 2, 1, 10.0), obs("m1", 2024, 2, 1, 15.0)];
        let latest = select_latest(&records);
        assert_eq!(latest["m1"].value, 15.0);
    }

    #[test]
    fn newest_date_beats_later_insertion() {
        let records = vec![
            obs("m1", 2024, 2, 3, 30.0),
            obs("m1", 2024, 2, 1, 10.0),
            obs("m1", 2024, 2, 2, 20.0),
        ];
        let latest = select_latest(&records);
        assert_eq!(latest["m1"].value, 30.0);
    }

    #[test]
    fn one_entry_per_metric_present() {
        let records = vec![
            obs("a", 2024, 1, 1, 1.0),
            obs("b", 2024, 1, 5, 2.0),
            obs("a", 2024, 1, 3, 3.0),
        ];
        let latest = select_latest(&records);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["a"].value, 3.0);
        assert!(!latest.contains_key("c"));
        assert!(select_latest(&[]).is_empty());
    }

    #[test]
    fn selection_is_reproducible_for_same_order() {
        let records = vec![
            obs("m1", 2024, 2, 1, 10.0),
            obs("m1", 2024, 2, 1, 12.0),
            obs("m1", 2024, 2, 1, 11.0),
        ];
        let first = select_latest(&records);
        let second = select_latest(&records);
        assert_eq!(first, second);
        assert_eq!(first["m1"].value, 11.0);
    }
}
