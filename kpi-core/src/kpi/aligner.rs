//! Resamples per-metric observations onto one shared date axis.
//!
//! Duplicate observations for the same metric and date collapse with
//! last-write-wins on input order: the record appearing later in `records`
//! replaces earlier ones. Stores return observations in ingestion order, so a
//! correction appended after the original value takes effect.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::models::MetricObservation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    /// `None` when the metric has no observation on this date.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlignedSeries {
    pub axis: Vec<NaiveDate>,
    pub series: BTreeMap<String, Vec<SeriesPoint>>,
}

impl AlignedSeries {
    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    pub fn metric(&self, metric_id: &str) -> Option<&[SeriesPoint]> {
        self.series.get(metric_id).map(Vec::as_slice)
    }

    /// Present values of one metric in date order, skipping gaps.
    pub fn present_values(&self, metric_id: &str) -> Vec<f64> {
        self.metric(metric_id)
            .map(|points| points.iter().filter_map(|point| point.value).collect())
            .unwrap_or_default()
    }
}

pub fn align(records: &[MetricObservation], filter: Option<&BTreeSet<String>>) -> AlignedSeries {
    let mut axis = BTreeSet::new();
    let mut by_metric: HashMap<&str, HashMap<NaiveDate, f64>> = HashMap::new();

    for record in records {
        if let Some(filter) = filter {
            if !filter.contains(&record.metric_id) {
                continue;
            }
        }
        axis.insert(record.record_date);
        by_metric
            .entry(record.metric_id.as_str())
            .or_default()
            .insert(record.record_date, record.value);
    }

    let axis: Vec<NaiveDate> = axis.into_iter().collect();
    let series = by_metric
        .into_iter()
        .map(|(metric_id, values)| {
            let points = axis
                .iter()
                .map(|date| SeriesPoint {
                    date: *date,
                    value: values.get(date).copied(),
                })
                .collect();
            (metric_id.to_string(), points)
        })
        .collect();

    AlignedSeries { axis, series }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn obs(metric: &str, d: u32, value: f64) -> MetricObservation {
        MetricObservation::new(metric, "store-1", day(d), value)
    }

    #[test]
    fn axis_is_union_of_all_metric_dates() {
        let records = vec![
            obs("a", 1, 1.0),
            obs("a", 2, 2.0),
            obs("a", 3, 3.0),
            obs("b", 4, 40.0),
            obs("b", 2, 20.0),
            obs("b", 3, 30.0),
        ];
        let aligned = align(&records, None);
        assert_eq!(aligned.axis, vec![day(1), day(2), day(3), day(4)]);

        let a = aligned.metric("a").unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(a[3].value, None);
        assert_eq!(a[0].value, Some(1.0));

        let b = aligned.metric("b").unwrap();
        assert_eq!(b[0].value, None);
        assert_eq!(b[1].value, Some(20.0));
        assert_eq!(b[3].value, Some(40.0));
    }

    #[test]
    fn gaps_are_absent_not_zero() {
        let records = vec![obs("a", 1, 5.0), obs("b", 2, 0.0)];
        let aligned = align(&records, None);
        let a = aligned.metric("a").unwrap();
        assert_eq!(a[1], SeriesPoint { date: day(2), value: None });
        let b = aligned.metric("b").unwrap();
        assert_eq!(b[1].value, Some(0.0));
        assert_eq!(b[0].value, None);
    }

    #[test]
    fn later_duplicate_wins() {
        let records = vec![obs("a", 1, 10.0), obs("a", 1, 15.0), obs("a", 2, 7.0)];
        let aligned = align(&records, None);
        assert_eq!(aligned.present_values("a"), vec![15.0, 7.0]);
    }

    #[test]
    fn filter_restricts_axis_to_selected_metrics() {
        let records = vec![obs("a", 1, 1.0), obs("b", 5, 2.0), obs("a", 3, 3.0)];
        let filter: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        let aligned = align(&records, Some(&filter));
        assert_eq!(aligned.axis, vec![day(1), day(3)]);
        assert!(aligned.metric("b").is_none());
    }

    #[test]
    fn empty_input_yields_empty_series() {
        let aligned = align(&[], None);
        assert!(aligned.is_empty());
        assert!(aligned.series.is_empty());
        assert!(aligned.present_values("a").is_empty());
    }

    #[test]
    fn every_series_covers_exactly_the_axis() {
        let records = vec![
            obs("x", 9, 1.0),
            obs("y", 2, 1.0),
            obs("z", 5, 1.0),
            obs("x", 2, 1.0),
        ];
        let aligned = align(&records, None);
        let expected: BTreeSet<NaiveDate> = records.iter().map(|r| r.record_date).collect();
        assert_eq!(aligned.axis, expected.into_iter().collect::<Vec<_>>());
        for points in aligned.series.values() {
            let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
            assert_eq!(dates, aligned.axis);
        }
    }
}
