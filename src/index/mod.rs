//! Chronicle Cluster Metadata Indexes
//!
//! Narrow contracts the query layer resolves tag filters through:
//!
//! - **MetadataDatabase**: tag key name → tag key ID, per (namespace, metric)
//! - **TagMetadata**: tag key ID + leaf filter → bitmap of matching tag value IDs
//! - **Metadata**: bundles both for one database
//!
//! [`TagIndex`] is the in-memory implementation used by storage nodes.
//!
//! # Architecture
//!
//! ```text
//! Filter: host like 'web-*'
//!        ↓
//! MetadataDatabase: ("ns", "cpu", "host") → tag key 3
//!        ↓
//! TagMetadata: key 3, values {web-1: 1, web-2: 2, db-1: 3} → {1, 2}
//! ```

mod tag_index;

pub use tag_index::TagIndex;

use crate::query::TagFilter;
use roaring::RoaringBitmap;
use thiserror::Error;

/// Errors raised by metadata lookups
#[derive(Error, Debug)]
pub enum IndexError {
    /// No tag key with this name under the metric
    #[error("Tag key not found: {namespace}/{metric}/{tag_key}")]
    TagKeyNotFound {
        namespace: String,
        metric: String,
        tag_key: String,
    },

    /// Tag key ID unknown to the tag index
    #[error("Tag key id not found: {0}")]
    TagKeyIdNotFound(u32),

    /// `like`/`regex` pattern does not compile
    #[error("Invalid tag filter pattern: {0}")]
    InvalidPattern(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Resolves tag key names to IDs
pub trait MetadataDatabase: Send + Sync {
    fn get_tag_key_id(&self, namespace: &str, metric_name: &str, tag_key: &str)
        -> IndexResult<u32>;
}

/// Finds tag value IDs under one tag key
pub trait TagMetadata: Send + Sync {
    /// Bitmap of the value IDs of `tag_key_id` matching `filter`, empty when none match
    fn find_tag_value_ids_by_expr(
        &self,
        tag_key_id: u32,
        filter: &TagFilter,
    ) -> IndexResult<RoaringBitmap>;
}

/// Metadata of one database
pub trait Metadata: Send + Sync {
    fn metadata_database(&self) -> &dyn MetadataDatabase;
    fn tag_metadata(&self) -> &dyn TagMetadata;
}
