//! Chronicle Cluster Parallel Execution
//!
//! Root-side coordination of distributed queries over a physical plan.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!   caller ──JobContext→│  JobManager  │──→ job registry (DashMap)
//!                      └──────┬───────┘
//!                             │ root TaskContext + TaskRequest
//!                      ┌──────▼───────┐
//!                      │ TaskManager  │──→ Transport ──→ intermediates | leafs
//!                      └──────┬───────┘
//!                             │ TaskResponse
//!                      ┌──────▼───────┐
//!                      │ ResultMerger │──→ caller's channel
//!                      └──────────────┘
//! ```
//!
//! One job fans out to exactly one tier: its intermediates when the plan has
//! any, otherwise its leafs. Results flow back into the root task context and
//! are merged there.

mod error;
mod job_context;
mod job_manager;
mod merger;
mod task;
mod task_manager;

pub use error::{JobError, JobResult, TransportError};
pub use job_context::{JobContext, JobKind};
pub use job_manager::JobManager;
pub use merger::{GroupingResultMerger, ResultMerger, ResultSender, SuggestResultMerger, SuggestSender};
pub use task::{JobId, RequestType, TaskContext, TaskId, TaskRequest, TaskResponse, TaskType};
pub use task_manager::{DefaultTaskManager, TaskManager, Transport};
