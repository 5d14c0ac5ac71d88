//! Job context: everything the root keeps about one submitted job

use crate::models::PhysicalPlan;
use crate::parallel::merger::{ResultSender, SuggestSender};
use crate::query::{MetadataStmt, Query};
use tokio_util::sync::CancellationToken;

/// What a job asks for and where its results go
#[derive(Debug, Clone)]
pub enum JobKind {
    /// Data query, answered with one `ResultSet`
    Query { query: Query, result_tx: ResultSender },
    /// Metadata suggestion, answered with batches of strings
    Metadata {
        stmt: MetadataStmt,
        result_tx: SuggestSender,
    },
}

/// A distributed job as registered with the job manager
#[derive(Debug, Clone)]
pub struct JobContext {
    plan: PhysicalPlan,
    kind: JobKind,
    cancel: CancellationToken,
}

impl JobContext {
    /// Context for a data query
    pub fn query(
        plan: PhysicalPlan,
        query: Query,
        result_tx: ResultSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            plan,
            kind: JobKind::Query { query, result_tx },
            cancel,
        }
    }

    /// Context for a metadata suggestion query
    pub fn metadata(
        plan: PhysicalPlan,
        stmt: MetadataStmt,
        result_tx: SuggestSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            plan,
            kind: JobKind::Metadata { stmt, result_tx },
            cancel,
        }
    }

    pub fn plan(&self) -> &PhysicalPlan {
        &self.plan
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    /// The data query, `None` for metadata jobs
    pub fn data_query(&self) -> Option<&Query> {
        match &self.kind {
            JobKind::Query { query, .. } => Some(query),
            JobKind::Metadata { .. } => None,
        }
    }

    /// Token the caller cancels to stop result delivery
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop delivering results of this job
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
