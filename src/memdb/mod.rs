//! Chronicle Cluster Memory Database
//!
//! Buffers incoming field writes per family window until the window is
//! flushed to its immutable table.
//!
//! # Architecture
//!
//! ```text
//! Field write (requests = sum 3.0 @ 10:04:20)
//!        ↓ WriteContext { family_time: 10:00, slot_index: 26 }
//! FieldStore ──→ SegmentStore(10:00) ──→ slot 26 += 3.0
//!        ↓ flush_field_to(10:00)
//! TableFlusher ←── LZ4(bincode) + crc32 payload
//! ```

mod error;
mod field;
mod field_store;
mod flusher;
mod segment_store;

pub use error::{MemDbError, MemDbResult};
pub use field::{AggType, Field, FieldType, FieldValue, WriteContext};
pub use field_store::FieldStore;
pub use flusher::{FlushedField, MemoryTableFlusher, TableFlusher};
pub use segment_store::{decode_segment, SegmentBlock, SegmentStore, SimpleSegmentStore};
