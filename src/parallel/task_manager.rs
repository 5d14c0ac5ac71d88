//! Task Manager
//!
//! Allocates task IDs, tracks the task contexts waiting for sub-task results
//! on this node, and hands requests to the [`Transport`].
//!
//! ```text
//! JobManager ──send_request──→ TaskManager ──send──→ Transport ──→ remote node
//!                                   ↑
//!     remote node ──TaskResponse──→ receive ──→ TaskContext ──→ ResultMerger
//! ```

use crate::models::NodeIndicator;
use crate::parallel::error::TransportError;
use crate::parallel::task::{JobId, TaskContext, TaskId, TaskRequest, TaskResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Wire-level delivery of task requests to cluster nodes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a task request to `target`
    async fn send(&self, target: &NodeIndicator, req: &TaskRequest) -> Result<(), TransportError>;

    /// Ask `target` to drop the sub-task it runs for `job_id`
    async fn cancel(
        &self,
        target: &NodeIndicator,
        job_id: JobId,
        parent_task_id: &str,
    ) -> Result<(), TransportError>;
}

/// Task lifecycle on the node that dispatches and merges sub-tasks
#[async_trait]
pub trait TaskManager: Send + Sync {
    /// Allocate a task ID unique on this node
    fn alloc_task_id(&self) -> TaskId;

    /// Track a task context until its results are merged
    fn submit(&self, ctx: TaskContext);

    /// Stop tracking a task context
    fn remove(&self, task_id: &str) -> Option<Arc<TaskContext>>;

    /// Send a task request to one node
    async fn send_request(
        &self,
        target: &NodeIndicator,
        req: &TaskRequest,
    ) -> Result<(), TransportError>;

    /// Cancel a sub-task already dispatched to one node
    async fn cancel_request(
        &self,
        target: &NodeIndicator,
        job_id: JobId,
        parent_task_id: &str,
    ) -> Result<(), TransportError>;

    /// Route a partial result to its task context
    async fn receive(&self, resp: TaskResponse);
}

/// Task manager backed by a concurrent map of task contexts
pub struct DefaultTaskManager {
    node: NodeIndicator,
    seq: AtomicU64,
    tasks: DashMap<TaskId, Arc<TaskContext>>,
    transport: Arc<dyn Transport>,
}

impl DefaultTaskManager {
    /// Task manager of `node`, sending requests over `transport`
    pub fn new(node: NodeIndicator, transport: Arc<dyn Transport>) -> Self {
        Self {
            node,
            seq: AtomicU64::new(0),
            tasks: DashMap::new(),
            transport,
        }
    }

    /// Node this manager allocates task IDs for
    pub fn node(&self) -> &NodeIndicator {
        &self.node
    }

    /// Get a tracked task context
    pub fn get(&self, task_id: &str) -> Option<Arc<TaskContext>> {
        self.tasks.get(task_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of task contexts still waiting for results
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[async_trait]
impl TaskManager for DefaultTaskManager {
    fn alloc_task_id(&self) -> TaskId {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", self.node, seq)
    }

    fn submit(&self, ctx: TaskContext) {
        tracing::debug!(task_id = %ctx.task_id(), expect = ctx.expect_results(), "Task submitted");
        self.tasks.insert(ctx.task_id().to_string(), Arc::new(ctx));
    }

    fn remove(&self, task_id: &str) -> Option<Arc<TaskContext>> {
        self.tasks.remove(task_id).map(|(_, ctx)| ctx)
    }

    async fn send_request(
        &self,
        target: &NodeIndicator,
        req: &TaskRequest,
    ) -> Result<(), TransportError> {
        self.transport.send(target, req).await
    }

    async fn cancel_request(
        &self,
        target: &NodeIndicator,
        job_id: JobId,
        parent_task_id: &str,
    ) -> Result<(), TransportError> {
        self.transport.cancel(target, job_id, parent_task_id).await
    }

    async fn receive(&self, resp: TaskResponse) {
        let Some(ctx) = self.get(&resp.task_id) else {
            tracing::warn!(job_id = resp.job_id, task_id = %resp.task_id, node = %resp.send_node, "Response for unknown task dropped");
            return;
        };

        let task_id = resp.task_id.clone();
        if ctx.receive_result(resp).await {
            self.remove(&task_id);
            tracing::debug!(task_id = %task_id, "Task completed");
        }
    }
}
