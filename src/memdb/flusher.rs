//! Table flusher contract
//!
//! Receives encoded segments of one family window and writes them into the
//! immutable on-disk table of that window.

use crate::memdb::error::MemDbResult;
use crate::memdb::field::FieldType;

/// Sink for flushed field segments
pub trait TableFlusher {
    /// Accept one encoded segment; an error leaves the segment buffered
    fn flush_field(
        &mut self,
        field_id: u16,
        field_type: FieldType,
        data: &[u8],
        start_slot: u16,
        end_slot: u16,
    ) -> MemDbResult<()>;
}

/// One segment as handed to a flusher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedField {
    pub field_id: u16,
    pub field_type: FieldType,
    pub data: Vec<u8>,
    pub start_slot: u16,
    pub end_slot: u16,
}

/// Flusher that keeps every accepted segment in memory
#[derive(Debug, Default)]
pub struct MemoryTableFlusher {
    flushed: Vec<FlushedField>,
}

impl MemoryTableFlusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flushed(&self) -> &[FlushedField] {
        &self.flushed
    }

    /// Take the accepted segments, leaving the flusher empty
    pub fn drain(&mut self) -> Vec<FlushedField> {
        std::mem::take(&mut self.flushed)
    }
}

impl TableFlusher for MemoryTableFlusher {
    fn flush_field(
        &mut self,
        field_id: u16,
        field_type: FieldType,
        data: &[u8],
        start_slot: u16,
        end_slot: u16,
    ) -> MemDbResult<()> {
        self.flushed.push(FlushedField {
            field_id,
            field_type,
            data: data.to_vec(),
            start_slot,
            end_slot,
        });
        Ok(())
    }
}
