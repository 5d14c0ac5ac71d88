//! Segment stores: one family window of one field
//!
//! Encoded segment layout:
//!
//! ```text
//! ┌──────────────────────────────┬──────────────┐
//! │ LZ4(bincode(SegmentBlock))   │ crc32 (u32)  │
//! │ size-prepended               │ little endian│
//! └──────────────────────────────┴──────────────┘
//! ```

use crate::memdb::error::{MemDbError, MemDbResult};
use crate::memdb::field::{AggType, WriteContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Write buffer of one field for one family window
pub trait SegmentStore: Send + Sync + Debug {
    fn family_time(&self) -> i64;

    /// Merge a value into the context's slot
    fn write_float(&mut self, value: f64, ctx: &WriteContext);

    /// Encoded payload with the first and last occupied slot
    ///
    /// Does not consume the buffered data, so a failed flush can be retried.
    fn bytes(&self) -> MemDbResult<(Vec<u8>, u16, u16)>;

    /// First and last occupied slot
    fn slot_range(&self) -> MemDbResult<(u16, u16)>;
}

/// Decoded form of a segment payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentBlock {
    pub family_time: i64,
    pub start_slot: u16,
    pub end_slot: u16,
    /// (slot, value), ascending by slot
    pub values: Vec<(u16, f64)>,
}

/// Sparse slot buffer merging writes with an aggregation function
#[derive(Debug)]
pub struct SimpleSegmentStore {
    family_time: i64,
    agg: AggType,
    slots: BTreeMap<u16, f64>,
}

impl SimpleSegmentStore {
    pub fn new(family_time: i64, agg: AggType) -> Self {
        Self {
            family_time,
            agg,
            slots: BTreeMap::new(),
        }
    }

    pub fn agg_type(&self) -> AggType {
        self.agg
    }

    /// Value buffered in a slot
    pub fn get(&self, slot: u16) -> Option<f64> {
        self.slots.get(&slot).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl SegmentStore for SimpleSegmentStore {
    fn family_time(&self) -> i64 {
        self.family_time
    }

    fn write_float(&mut self, value: f64, ctx: &WriteContext) {
        let agg = self.agg;
        self.slots
            .entry(ctx.slot_index)
            .and_modify(|existing| *existing = agg.aggregate(*existing, value))
            .or_insert(value);
    }

    fn bytes(&self) -> MemDbResult<(Vec<u8>, u16, u16)> {
        let (start_slot, end_slot) = self.slot_range()?;
        let block = SegmentBlock {
            family_time: self.family_time,
            start_slot,
            end_slot,
            values: self.slots.iter().map(|(&slot, &value)| (slot, value)).collect(),
        };

        let serialized = bincode::serialize(&block)?;
        let mut data = lz4_flex::compress_prepend_size(&serialized);
        let checksum = crc32fast::hash(&data);
        data.extend_from_slice(&checksum.to_le_bytes());

        Ok((data, start_slot, end_slot))
    }

    fn slot_range(&self) -> MemDbResult<(u16, u16)> {
        match (self.slots.keys().next(), self.slots.keys().next_back()) {
            (Some(&start), Some(&end)) => Ok((start, end)),
            _ => Err(MemDbError::EmptySegment(self.family_time)),
        }
    }
}

/// Decode a payload produced by [`SimpleSegmentStore::bytes`]
pub fn decode_segment(data: &[u8]) -> MemDbResult<SegmentBlock> {
    if data.len() < 4 {
        return Err(MemDbError::Corruption(format!(
            "payload too short: {} bytes",
            data.len()
        )));
    }

    let (body, crc) = data.split_at(data.len() - 4);
    let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(MemDbError::Corruption(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            stored, computed
        )));
    }

    let decompressed = lz4_flex::decompress_size_prepended(body)
        .map_err(|e| MemDbError::Encode(e.to_string()))?;
    Ok(bincode::deserialize(&decompressed)?)
}
