//! Field store: the buffered segments of one metric field
//!
//! Segments are kept in a vector sorted by family time. A field only holds
//! the few windows not yet flushed, so binary search plus shifting beats a
//! map here.
//!
//! ```text
//! FieldStore "requests" (id 7, sum)
//!   [ 10:00 → SegmentStore ][ 11:00 → SegmentStore ][ 12:00 → SegmentStore ]
//!          ↑ flush_field_to(10:00) removes it once the flusher accepts it
//! ```

use crate::memdb::field::{Field, FieldType, WriteContext};
use crate::memdb::flusher::TableFlusher;
use crate::memdb::segment_store::{SegmentStore, SimpleSegmentStore};
use crate::query::TimeRange;

/// Time-partitioned write buffers of one (metric, field) pair
///
/// Not synchronized: the owning shard serializes writes, flushes and reads.
#[derive(Debug)]
pub struct FieldStore {
    field_name: String,
    field_id: u16,
    field_type: FieldType,
    segments: Vec<Box<dyn SegmentStore>>,
}

impl FieldStore {
    pub fn new(field_name: impl Into<String>, field_id: u16, field_type: FieldType) -> Self {
        Self {
            field_name: field_name.into(),
            field_id,
            field_type,
            segments: Vec::new(),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn field_id(&self) -> u16 {
        self.field_id
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Family times of the buffered segments, ascending
    pub fn family_times(&self) -> Vec<i64> {
        self.segments.iter().map(|s| s.family_time()).collect()
    }

    /// Segment buffering the given family window
    pub fn segment(&self, family_time: i64) -> Option<&dyn SegmentStore> {
        self.position(family_time).map(|idx| self.segments[idx].as_ref())
    }

    /// Write one field value into its family window
    ///
    /// A field without a value, or whose kind differs from the store's
    /// field type, is logged and dropped.
    pub fn write(&mut self, field: &Field, ctx: WriteContext) {
        let Some(value) = field.value else {
            tracing::warn!(
                field = %self.field_name,
                family_time = ctx.family_time,
                "Field without value dropped"
            );
            return;
        };
        if value.field_type() != self.field_type {
            tracing::warn!(
                field = %self.field_name,
                family_time = ctx.family_time,
                expected = %self.field_type,
                got = %value.field_type(),
                "Field of mismatched type dropped"
            );
            return;
        }

        let idx = match self.position(ctx.family_time) {
            Some(idx) => idx,
            None => self.insert(Box::new(SimpleSegmentStore::new(
                ctx.family_time,
                self.field_type.agg_type(),
            ))),
        };
        self.segments[idx].write_float(value.value(), &ctx);
    }

    /// Flush the segment of one family window
    ///
    /// Returns false when nothing is buffered for `family_time` or the
    /// segment could not be handed over. The segment is only dropped after
    /// the flusher accepted it, so a failed flush is retried by the next call.
    pub fn flush_field_to(&mut self, flusher: &mut dyn TableFlusher, family_time: i64) -> bool {
        let Some(idx) = self.position(family_time) else {
            return false;
        };

        let (data, start_slot, end_slot) = match self.segments[idx].bytes() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(field = %self.field_name, family_time, error = %e, "Failed to encode segment");
                return false;
            }
        };

        if let Err(e) =
            flusher.flush_field(self.field_id, self.field_type, &data, start_slot, end_slot)
        {
            tracing::error!(field = %self.field_name, family_time, error = %e, "Failed to flush segment, kept for retry");
            return false;
        }

        self.segments.remove(idx);
        tracing::debug!(
            field = %self.field_name,
            family_time,
            bytes = data.len(),
            "Segment flushed"
        );
        true
    }

    /// Time range covered by the buffered data
    ///
    /// Slots convert to timestamps as `family_time + slot * interval`,
    /// saturating at the `i64` bounds. Segments without a slot range are
    /// skipped; `None` when none has one.
    pub fn time_range(&self, interval: i64) -> Option<TimeRange> {
        let mut range: Option<TimeRange> = None;

        for segment in &self.segments {
            let Ok((start_slot, end_slot)) = segment.slot_range() else {
                continue;
            };
            let family_time = segment.family_time();
            let start = family_time.saturating_add(i64::from(start_slot).saturating_mul(interval));
            let end = family_time.saturating_add(i64::from(end_slot).saturating_mul(interval));

            range = Some(match range {
                Some(r) => TimeRange::new(r.start.min(start), r.end.max(end)),
                None => TimeRange::new(start, end),
            });
        }
        range
    }

    fn position(&self, family_time: i64) -> Option<usize> {
        self.segments
            .binary_search_by_key(&family_time, |s| s.family_time())
            .ok()
    }

    /// Append then restore ordering; returns the segment's index
    fn insert(&mut self, segment: Box<dyn SegmentStore>) -> usize {
        let family_time = segment.family_time();
        self.segments.push(segment);
        self.segments.sort_by_key(|s| s.family_time());
        self.position(family_time).unwrap_or(self.segments.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memdb::error::{MemDbError, MemDbResult};
    use crate::memdb::field::{AggType, FieldValue};
    use crate::memdb::flusher::MemoryTableFlusher;
    use crate::memdb::segment_store::decode_segment;

    const HOUR: i64 = 3_600_000;

    fn sum(v: f64) -> Field {
        Field::new("requests", FieldValue::Sum(v))
    }

    /// Flusher that refuses the first `failures` payloads
    struct FlakyFlusher {
        failures: usize,
        inner: MemoryTableFlusher,
    }

    impl TableFlusher for FlakyFlusher {
        fn flush_field(
            &mut self,
            field_id: u16,
            field_type: FieldType,
            data: &[u8],
            start_slot: u16,
            end_slot: u16,
        ) -> MemDbResult<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(MemDbError::Flush("table locked".into()));
            }
            self.inner
                .flush_field(field_id, field_type, data, start_slot, end_slot)
        }
    }

    #[test]
    fn test_same_family_time_shares_segment() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        store.write(&sum(1.0), WriteContext::new(HOUR, 1));
        store.write(&sum(2.0), WriteContext::new(HOUR, 5));

        assert_eq!(store.segment_count(), 1);
        assert_eq!(store.segment(HOUR).unwrap().slot_range().unwrap(), (1, 5));
    }

    #[test]
    fn test_segments_sorted_by_family_time() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        store.write(&sum(1.0), WriteContext::new(3 * HOUR, 0));
        store.write(&sum(1.0), WriteContext::new(HOUR, 0));
        store.write(&sum(1.0), WriteContext::new(2 * HOUR, 0));
        store.write(&sum(1.0), WriteContext::new(HOUR, 2));

        assert_eq!(store.family_times(), vec![HOUR, 2 * HOUR, 3 * HOUR]);
        assert!(store.segment(4 * HOUR).is_none());
    }

    #[test]
    fn test_write_without_value_is_dropped() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        store.write(&Field::empty("requests"), WriteContext::new(HOUR, 0));
        assert_eq!(store.segment_count(), 0);
    }

    #[test]
    fn test_flush_unknown_family_time() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        let mut flusher = MemoryTableFlusher::new();

        assert!(!store.flush_field_to(&mut flusher, HOUR));
        assert!(flusher.flushed().is_empty());
    }

    #[test]
    fn test_flush_once_per_family_time() {
        let mut store = FieldStore::new("requests", 7, FieldType::Sum);
        store.write(&sum(1.0), WriteContext::new(HOUR, 3));
        store.write(&sum(2.0), WriteContext::new(HOUR, 3));
        store.write(&sum(5.0), WriteContext::new(2 * HOUR, 0));
        let mut flusher = MemoryTableFlusher::new();

        assert!(store.flush_field_to(&mut flusher, HOUR));
        assert!(!store.flush_field_to(&mut flusher, HOUR));
        assert_eq!(flusher.flushed().len(), 1);
        assert_eq!(store.family_times(), vec![2 * HOUR]);

        let flushed = &flusher.flushed()[0];
        assert_eq!(flushed.field_id, 7);
        assert_eq!(flushed.field_type, FieldType::Sum);
        assert_eq!((flushed.start_slot, flushed.end_slot), (3, 3));
        assert_eq!(decode_segment(&flushed.data).unwrap().values, vec![(3, 3.0)]);
    }

    #[test]
    fn test_failed_flush_keeps_segment() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        store.write(&sum(1.0), WriteContext::new(HOUR, 0));
        let mut flusher = FlakyFlusher {
            failures: 1,
            inner: MemoryTableFlusher::new(),
        };

        assert!(!store.flush_field_to(&mut flusher, HOUR));
        assert_eq!(store.segment_count(), 1);

        assert!(store.flush_field_to(&mut flusher, HOUR));
        assert_eq!(store.segment_count(), 0);
        assert_eq!(flusher.inner.flushed().len(), 1);
    }

    #[test]
    fn test_time_range() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        assert_eq!(store.time_range(10_000), None);

        store.write(&sum(1.0), WriteContext::new(2 * HOUR, 4));
        store.write(&sum(1.0), WriteContext::new(HOUR, 2));
        store.write(&sum(1.0), WriteContext::new(HOUR, 9));

        let range = store.time_range(10_000).unwrap();
        assert_eq!(range.start, HOUR + 20_000);
        assert_eq!(range.end, 2 * HOUR + 40_000);
    }

    #[test]
    fn test_mismatched_field_type_is_dropped() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        store.write(&Field::new("requests", FieldValue::Gauge(5.0)), WriteContext::new(0, 1));
        assert_eq!(store.segment_count(), 0);

        store.write(&sum(3.0), WriteContext::new(0, 1));
        store.write(&Field::new("requests", FieldValue::Max(9.0)), WriteContext::new(0, 1));
        store.write(&sum(5.0), WriteContext::new(0, 1));

        let mut flusher = MemoryTableFlusher::new();
        assert!(store.flush_field_to(&mut flusher, 0));
        let flushed = &flusher.flushed()[0];
        assert_eq!(flushed.field_type, FieldType::Sum);
        assert_eq!(decode_segment(&flushed.data).unwrap().values, vec![(1, 8.0)]);
    }

    #[test]
    fn test_time_range_skips_empty_segment() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        store.insert(Box::new(SimpleSegmentStore::new(0, AggType::Sum)));
        assert_eq!(store.time_range(10_000), None);

        store.write(&sum(1.0), WriteContext::new(HOUR, 2));
        assert_eq!(store.segment_count(), 2);
        assert_eq!(
            store.time_range(10_000),
            Some(TimeRange::new(HOUR + 20_000, HOUR + 20_000))
        );
    }

    #[test]
    fn test_unencodable_segment_is_kept() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        store.insert(Box::new(SimpleSegmentStore::new(0, AggType::Sum)));
        store.write(&sum(1.0), WriteContext::new(HOUR, 0));
        let mut flusher = MemoryTableFlusher::new();

        assert!(!store.flush_field_to(&mut flusher, 0));
        assert_eq!(store.segment_count(), 2);
        assert!(flusher.flushed().is_empty());

        assert!(store.flush_field_to(&mut flusher, HOUR));
        assert_eq!(store.family_times(), vec![0]);
    }

    #[test]
    fn test_time_range_saturates() {
        let mut store = FieldStore::new("requests", 1, FieldType::Sum);
        store.write(&sum(1.0), WriteContext::new(HOUR, 3));

        let range = store.time_range(i64::MAX).unwrap();
        assert_eq!(range, TimeRange::new(i64::MAX, i64::MAX));
    }

    #[test]
    fn test_gauge_keeps_last_value() {
        let mut store = FieldStore::new("temperature", 2, FieldType::Gauge);
        let gauge = |v| Field::new("temperature", FieldValue::Gauge(v));
        store.write(&gauge(20.0), WriteContext::new(0, 1));
        store.write(&gauge(18.5), WriteContext::new(0, 1));

        let mut flusher = MemoryTableFlusher::new();
        assert!(store.flush_field_to(&mut flusher, 0));
        let block = decode_segment(&flusher.flushed()[0].data).unwrap();
        assert_eq!(block.values, vec![(1, 18.5)]);
    }
}
