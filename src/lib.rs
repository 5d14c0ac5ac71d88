//! # Chronicle Cluster
//!
//! Query-and-storage core of the distributed Chronicle time-series database.
//!
//! ## Features
//!
//! - **Job coordination**: fans a physical plan out to intermediate or leaf
//!   nodes and merges their partial results
//! - **Tag resolution**: turns tag filter expressions into roaring bitmaps of
//!   matching tag value IDs
//! - **Field buffering**: time-partitioned in-memory segments flushed to
//!   immutable tables
//!
//! ## Modules
//!
//! - [`parallel`]: Job manager, task manager and result mergers
//! - [`query`]: Tag filter expressions, queries and the tag search
//! - [`index`]: Metadata contracts and the in-memory tag index
//! - [`memdb`]: Field stores and segment stores
//! - [`aggregation`]: Grouping aggregator and result payloads
//! - [`models`]: Physical plans
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chronicle_cluster::*;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # struct Network;
//! # #[async_trait::async_trait]
//! # impl Transport for Network {
//! #     async fn send(&self, _: &NodeIndicator, _: &TaskRequest) -> Result<(), TransportError> { Ok(()) }
//! #     async fn cancel(&self, _: &NodeIndicator, _: JobId, _: &str) -> Result<(), TransportError> { Ok(()) }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), JobError> {
//!     let task_manager = Arc::new(DefaultTaskManager::new("broker-1".into(), Arc::new(Network)));
//!     let jobs = JobManager::new(task_manager);
//!
//!     let plan = PhysicalPlan::new("db", Root { indicator: "broker-1".into(), num_of_task: 1 })
//!         .leaf(Leaf { indicator: "storage-1".into(), parent: "broker-1".into(), shard_ids: vec![1] });
//!     let query = Query::new("ns", "cpu", &["usage"], TimeRange::new(0, 3_600_000), 60_000);
//!
//!     let (tx, mut rx) = mpsc::channel(1);
//!     let job_id = jobs.submit_job(JobContext::query(plan, query, tx, CancellationToken::new())).await?;
//!     println!("Submitted job {}", job_id);
//!
//!     if let Some(result) = rx.recv().await {
//!         println!("{} series", result?.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod config;
pub mod index;
pub mod memdb;
pub mod models;
pub mod parallel;
pub mod query;

// Re-export top-level types for convenience
pub use aggregation::{
    AggregationFunc, AggregatorSpec, AggregatorSpecs, GroupingAggregator, ResultSet, SeriesList,
    TimeSeries,
};

pub use config::{Config, ConfigError, CoordinatorConfig, LoggingConfig, MemDbConfig};

pub use index::{IndexError, IndexResult, Metadata, MetadataDatabase, TagIndex, TagMetadata};

pub use memdb::{
    Field, FieldStore, FieldType, FieldValue, MemDbError, MemDbResult, MemoryTableFlusher,
    SegmentStore, SimpleSegmentStore, TableFlusher, WriteContext,
};

pub use models::{Intermediate, Leaf, NodeIndicator, PhysicalPlan, Root};

pub use parallel::{
    DefaultTaskManager, JobContext, JobError, JobId, JobManager, JobResult, RequestType,
    TaskManager, TaskRequest, TaskResponse, Transport, TransportError,
};

pub use query::{
    BinaryOp, Expr, MetadataStmt, MetadataType, Query, QueryError, QueryResult, TagFilter,
    TagFilterResult, TagSearch, TimeRange,
};
