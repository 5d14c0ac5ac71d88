//! Task request/response messages and root-side task bookkeeping

use crate::models::NodeIndicator;
use crate::parallel::merger::ResultMerger;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Identifier of a distributed query job
pub type JobId = i64;

/// Identifier of a task, unique per allocating node (`"{node}-{seq}"`)
pub type TaskId = String;

/// Kind of work a task request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Data query, payload is a `Query`
    Query,
    /// Metadata suggestion, payload is a `MetadataStmt`
    Metadata,
}

/// Request sent to one remote node for one job
///
/// Built once per job and shared by reference across every recipient of the
/// fan-out tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub job_id: JobId,
    pub parent_task_id: TaskId,
    pub request_type: RequestType,
    /// JSON-encoded `PhysicalPlan`
    pub physical_plan: Vec<u8>,
    /// JSON-encoded `Query` or `MetadataStmt`
    pub payload: Vec<u8>,
}

/// Partial result streamed back from a remote node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub job_id: JobId,
    /// Task the response belongs to (the parent task of the sender)
    pub task_id: TaskId,
    pub send_node: NodeIndicator,
    /// Whether the sender has finished its sub-task
    pub completed: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// JSON-encoded `SeriesList` or `Vec<String>`
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl TaskResponse {
    /// Final successful response of a sub-task
    pub fn completed(
        job_id: JobId,
        task_id: impl Into<TaskId>,
        send_node: NodeIndicator,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            job_id,
            task_id: task_id.into(),
            send_node,
            completed: true,
            error: None,
            payload,
        }
    }

    /// Failure of a sub-task
    pub fn failed(
        job_id: JobId,
        task_id: impl Into<TaskId>,
        send_node: NodeIndicator,
        error: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            task_id: task_id.into(),
            send_node,
            completed: true,
            error: Some(error.into()),
            payload: Vec::new(),
        }
    }
}

/// Role of a task in the plan tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Root,
    Intermediate,
    Leaf,
}

/// Bookkeeping for a task whose sub-task results arrive at this node
pub struct TaskContext {
    task_id: TaskId,
    task_type: TaskType,
    expect_results: usize,
    received: AtomicUsize,
    done: AtomicBool,
    merger: Box<dyn ResultMerger>,
}

impl TaskContext {
    pub fn new(
        task_id: TaskId,
        task_type: TaskType,
        expect_results: usize,
        merger: Box<dyn ResultMerger>,
    ) -> Self {
        Self {
            task_id,
            task_type,
            expect_results,
            received: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            merger,
        }
    }

    /// ID sub-task responses are addressed to
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Role of this task in the plan tree
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Completed sub-tasks needed before the task finishes
    pub fn expect_results(&self) -> usize {
        self.expect_results
    }

    /// Completed sub-task results received so far
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Whether a terminal outcome was already handed to the merger
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Feed one response to the merger; returns true once the task is done
    ///
    /// The task is done when every expected sub-task completed or any of
    /// them failed. Responses arriving after that are dropped. Whichever of
    /// the first failure and the last completion flips `done` first is the
    /// only one that reaches the merger as a terminal outcome.
    pub async fn receive_result(&self, resp: TaskResponse) -> bool {
        if self.is_done() {
            tracing::debug!(task_id = %self.task_id, node = %resp.send_node, "Late task response dropped");
            return true;
        }

        if resp.error.is_some() {
            if self.done.swap(true, Ordering::SeqCst) {
                tracing::debug!(task_id = %self.task_id, node = %resp.send_node, "Late task failure dropped");
            } else {
                self.merger.merge(resp).await;
            }
            return true;
        }

        let completed = resp.completed;
        self.merger.merge(resp).await;

        if completed {
            let received = self.received.fetch_add(1, Ordering::SeqCst) + 1;
            if received >= self.expect_results && !self.done.swap(true, Ordering::SeqCst) {
                self.merger.finish().await;
                return true;
            }
        }
        self.is_done()
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("task_type", &self.task_type)
            .field("expect_results", &self.expect_results)
            .field("received", &self.received())
            .finish()
    }
}
