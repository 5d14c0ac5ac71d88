//! Grouping aggregator used by the root task of a data query

use crate::aggregation::{AggregatorSpecs, ResultSet, TimeSeries};
use crate::query::TimeRange;
use std::collections::BTreeMap;

type Tags = BTreeMap<String, String>;

/// bucket start → values collected for that bucket
type Buckets = BTreeMap<i64, Vec<f64>>;

/// Folds partial series into per-group, per-field, per-bucket values
#[derive(Debug)]
pub struct GroupingAggregator {
    interval: i64,
    time_range: TimeRange,
    specs: AggregatorSpecs,
    /// group tags → buckets per spec (same order as `specs`)
    groups: BTreeMap<Tags, Vec<Buckets>>,
}

impl GroupingAggregator {
    /// Create an aggregator for buckets of `interval` ms inside `time_range`
    pub fn new(interval: i64, time_range: TimeRange, specs: AggregatorSpecs) -> Self {
        Self {
            interval: interval.max(1),
            time_range,
            specs,
            groups: BTreeMap::new(),
        }
    }

    /// Field and function pairs, in output order
    pub fn specs(&self) -> &AggregatorSpecs {
        &self.specs
    }

    /// Bucket width in ms, at least 1
    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Inclusive range points must fall in
    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    /// Start of the bucket `timestamp` falls in
    ///
    /// Computed in i128 so ranges spanning the whole i64 domain cannot
    /// overflow; for an in-range timestamp the result lies in
    /// `[time_range.start, timestamp]`.
    fn bucket(&self, timestamp: i64) -> i64 {
        let start = i128::from(self.time_range.start);
        let interval = i128::from(self.interval);
        let offset = i128::from(timestamp) - start;
        i64::try_from(start + offset.div_euclid(interval) * interval)
            .unwrap_or(self.time_range.start)
    }

    /// Fold one partial series; points outside the time range and fields
    /// that were not requested are ignored
    pub fn aggregate(&mut self, series: &TimeSeries) {
        let spec_count = self.specs.len();
        let mut collected: Vec<Vec<(i64, f64)>> = vec![Vec::new(); spec_count];

        for (idx, spec) in self.specs.iter().enumerate() {
            let Some(points) = series.fields.get(&spec.field_name) else {
                continue;
            };
            collected[idx] = points
                .iter()
                .filter(|(ts, _)| self.time_range.contains(*ts))
                .map(|&(ts, value)| (self.bucket(ts), value))
                .collect();
        }

        if collected.iter().all(Vec::is_empty) {
            return;
        }

        let buckets = self
            .groups
            .entry(series.tags.clone())
            .or_insert_with(|| vec![Buckets::new(); spec_count]);
        for (field_buckets, points) in buckets.iter_mut().zip(collected) {
            for (bucket, value) in points {
                field_buckets.entry(bucket).or_default().push(value);
            }
        }
    }

    /// Number of tag groups seen so far
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Aggregated result, groups ordered by tags, buckets ascending
    pub fn result_set(&self) -> ResultSet {
        let series = self
            .groups
            .iter()
            .map(|(tags, buckets)| {
                let mut out = TimeSeries {
                    tags: tags.clone(),
                    fields: BTreeMap::new(),
                };
                for (spec, field_buckets) in self.specs.iter().zip(buckets) {
                    let points: Vec<(i64, f64)> = field_buckets
                        .iter()
                        .filter_map(|(&bucket, values)| {
                            spec.func.apply(values).map(|v| (bucket, v))
                        })
                        .collect();
                    if !points.is_empty() {
                        out.fields.insert(spec.field_name.clone(), points);
                    }
                }
                out
            })
            .collect();

        ResultSet {
            fields: self.specs.iter().map(|s| s.field_name.clone()).collect(),
            series,
        }
    }
}
