//! Job Manager
//!
//! Root-broker side of a distributed query:
//!
//! ```text
//! submit_job(ctx)
//!   1. validate plan        → EmptyPlan, before any ID is allocated
//!   2. job ID               ← atomic sequence
//!   3. root task ID         ← TaskManager
//!   4. root TaskContext     (aggregator/suggest merger → caller's channel)
//!   5. dispatch             intermediates, else leafs; stop at first failure
//!   6. register job         only when every dispatch succeeded
//! ```
//!
//! A failed dispatch leaves earlier recipients running their sub-task; when
//! rollback is enabled a background task asks each of them to cancel. A
//! cancellation that itself fails is logged and the remote task may be
//! orphaned until it finishes on its own.

use crate::aggregation::{AggregatorSpec, AggregatorSpecs, GroupingAggregator};
use crate::config::CoordinatorConfig;
use crate::models::{NodeIndicator, PhysicalPlan};
use crate::parallel::error::{JobError, JobResult};
use crate::parallel::job_context::{JobContext, JobKind};
use crate::parallel::merger::{
    GroupingResultMerger, ResultMerger, SuggestResultMerger, SuggestSender,
};
use crate::parallel::task::{JobId, RequestType, TaskContext, TaskRequest, TaskType};
use crate::parallel::task_manager::TaskManager;
use crate::query::{MetadataStmt, Query};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Coordinates distributed query jobs on the root broker
pub struct JobManager {
    task_manager: Arc<dyn TaskManager>,
    config: CoordinatorConfig,
    seq: AtomicI64,
    jobs: DashMap<JobId, Arc<JobContext>>,
}

impl JobManager {
    /// Create a job manager with default configuration
    pub fn new(task_manager: Arc<dyn TaskManager>) -> Self {
        Self::with_config(task_manager, CoordinatorConfig::default())
    }

    /// Create a job manager whose dispatch follows `config`
    pub fn with_config(task_manager: Arc<dyn TaskManager>, config: CoordinatorConfig) -> Self {
        Self {
            task_manager,
            config,
            seq: AtomicI64::new(0),
            jobs: DashMap::new(),
        }
    }

    /// Submit a job and fan its task request out over the plan
    ///
    /// Data queries go to the intermediates when the plan has any, otherwise
    /// to the leafs; metadata queries always go to the leafs. Returns the job
    /// ID, which `get_job` resolves from then on. On error the job is never
    /// registered.
    pub async fn submit_job(&self, ctx: JobContext) -> JobResult<JobId> {
        let plan = ctx.plan();
        let targets = match ctx.kind() {
            JobKind::Query { .. } => plan.targets(),
            JobKind::Metadata { .. } => plan.leaf_targets(),
        };
        if targets.is_empty() {
            return Err(JobError::EmptyPlan(plan.database.clone()));
        }

        let plan_payload = serde_json::to_vec(plan)?;
        let job_id = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let task_id = self.task_manager.alloc_task_id();

        let (request_type, payload, merger): (RequestType, Vec<u8>, Box<dyn ResultMerger>) =
            match ctx.kind() {
                JobKind::Query { query, result_tx } => {
                    let aggregator = GroupingAggregator::new(
                        query.interval,
                        query.time_range,
                        build_aggregator_specs(query),
                    );
                    (
                        RequestType::Query,
                        serde_json::to_vec(query)?,
                        Box::new(GroupingResultMerger::new(
                            aggregator,
                            result_tx.clone(),
                            ctx.cancel_token().clone(),
                        )),
                    )
                }
                JobKind::Metadata { stmt, result_tx } => (
                    RequestType::Metadata,
                    serde_json::to_vec(stmt)?,
                    Box::new(SuggestResultMerger::new(
                        result_tx.clone(),
                        ctx.cancel_token().clone(),
                    )),
                ),
            };

        let req = TaskRequest {
            job_id,
            parent_task_id: task_id.clone(),
            request_type,
            physical_plan: plan_payload,
            payload,
        };

        self.task_manager.submit(TaskContext::new(
            task_id.clone(),
            TaskType::Root,
            plan.root.num_of_task,
            merger,
        ));

        if let Err(err) = self.dispatch(job_id, &targets, &req).await {
            self.task_manager.remove(&task_id);
            return Err(err);
        }

        tracing::debug!(job_id, task_id = %task_id, targets = targets.len(), "Job submitted");
        self.jobs.insert(job_id, Arc::new(ctx));
        Ok(job_id)
    }

    /// Submit a metadata (suggestion) job, dispatched to the plan's leafs
    pub async fn submit_metadata_job(
        &self,
        cancel: CancellationToken,
        plan: PhysicalPlan,
        stmt: MetadataStmt,
        result_tx: SuggestSender,
    ) -> JobResult<JobId> {
        self.submit_job(JobContext::metadata(plan, stmt, result_tx, cancel))
            .await
    }

    /// Look up a registered job; `None` when unknown or already removed
    pub fn get_job(&self, job_id: JobId) -> Option<Arc<JobContext>> {
        self.jobs.get(&job_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a job from the registry
    pub fn remove_job(&self, job_id: JobId) -> Option<Arc<JobContext>> {
        self.jobs.remove(&job_id).map(|(_, ctx)| ctx)
    }

    /// Number of registered jobs
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Task manager jobs are dispatched through
    pub fn get_task_manager(&self) -> &Arc<dyn TaskManager> {
        &self.task_manager
    }

    /// Send the request to each target in order, stopping at the first failure
    async fn dispatch(
        &self,
        job_id: JobId,
        targets: &[&NodeIndicator],
        req: &TaskRequest,
    ) -> JobResult<()> {
        let mut sent: Vec<NodeIndicator> = Vec::with_capacity(targets.len());

        for &target in targets {
            if let Err(source) = self.task_manager.send_request(target, req).await {
                tracing::warn!(
                    job_id,
                    node = %target,
                    dispatched = sent.len(),
                    error = %source,
                    "Task dispatch failed"
                );
                self.rollback(job_id, &req.parent_task_id, sent);
                return Err(JobError::Dispatch {
                    indicator: target.clone(),
                    source,
                });
            }
            sent.push(target.clone());
        }
        Ok(())
    }

    /// Best-effort cancellation of sub-tasks already dispatched
    fn rollback(&self, job_id: JobId, parent_task_id: &str, sent: Vec<NodeIndicator>) {
        if sent.is_empty() || !self.config.rollback_on_dispatch_failure {
            return;
        }

        let task_manager = Arc::clone(&self.task_manager);
        let parent_task_id = parent_task_id.to_string();
        tokio::spawn(async move {
            for node in sent {
                if let Err(err) = task_manager
                    .cancel_request(&node, job_id, &parent_task_id)
                    .await
                {
                    tracing::error!(
                        job_id,
                        node = %node,
                        error = %err,
                        "Failed to cancel dispatched task, it may be orphaned"
                    );
                }
            }
        });
    }
}

/// One spec per requested field, in select order
fn build_aggregator_specs(query: &Query) -> AggregatorSpecs {
    query
        .field_names
        .iter()
        .map(|name| {
            let spec = AggregatorSpec::new(name.as_str());
            match query.func_for(name) {
                Some(func) => spec.func(func),
                None => spec,
            }
        })
        .collect()
}
