//! Chronicle Cluster Query Layer
//!
//! - **expr**: query statements and the tag filter expression tree
//! - **tag_search**: resolves a condition's leaf filters to tag value bitmaps
//! - **error**: query errors
//!
//! # Example
//!
//! ```rust,ignore
//! use chronicle_cluster::query::{Expr, TagFilter, TagSearch};
//!
//! let condition = Expr::and(
//!     Expr::tag(TagFilter::equals("zone", "z1")),
//!     Expr::not(Expr::tag(TagFilter::like("host", "db-*"))),
//! );
//! let leaves = TagSearch::new("ns", "cpu", Some(&condition), &index).filter()?;
//! ```

mod error;
mod expr;
mod tag_search;

pub use error::{QueryError, QueryResult};
pub use expr::{
    BinaryOp, Expr, MetadataStmt, MetadataType, Query, TagFilter, TimeRange, ValueMatcher,
};
pub use tag_search::{TagFilterResult, TagSearch};
