//! Result mergers
//!
//! A merger folds the partial results of a root task into the channel the
//! caller reads from:
//!
//! - [`GroupingResultMerger`]: data queries, folds `SeriesList` payloads into
//!   a `GroupingAggregator` and sends one `ResultSet` when the task finishes
//! - [`SuggestResultMerger`]: metadata queries, forwards each `Vec<String>`
//!   payload as it arrives

use crate::aggregation::{GroupingAggregator, ResultSet, SeriesList};
use crate::parallel::error::JobError;
use crate::parallel::task::TaskResponse;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Channel receiving the final result of a data query
pub type ResultSender = mpsc::Sender<Result<ResultSet, JobError>>;

/// Channel receiving metadata suggestions
pub type SuggestSender = mpsc::Sender<Vec<String>>;

/// Folds partial task results into a caller-visible sink
#[async_trait]
pub trait ResultMerger: Send + Sync {
    /// Fold one partial response
    async fn merge(&self, resp: TaskResponse);

    /// Every expected sub-task completed
    async fn finish(&self);
}

/// Merger for data queries
pub struct GroupingResultMerger {
    aggregator: Mutex<GroupingAggregator>,
    result_tx: ResultSender,
    cancel: CancellationToken,
    failed: AtomicBool,
}

impl GroupingResultMerger {
    pub fn new(
        aggregator: GroupingAggregator,
        result_tx: ResultSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            aggregator: Mutex::new(aggregator),
            result_tx,
            cancel,
            failed: AtomicBool::new(false),
        }
    }

    async fn fail(&self, err: JobError) {
        if self.failed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.result_tx.send(Err(err)).await.is_err() {
            tracing::debug!("Result receiver dropped before error delivery");
        }
    }
}

#[async_trait]
impl ResultMerger for GroupingResultMerger {
    async fn merge(&self, resp: TaskResponse) {
        if self.cancel.is_cancelled() || self.failed.load(Ordering::SeqCst) {
            return;
        }

        if let Some(message) = resp.error {
            tracing::warn!(job_id = resp.job_id, node = %resp.send_node, error = %message, "Sub-task failed");
            self.fail(JobError::TaskFailed {
                node: resp.send_node,
                message,
            })
            .await;
            return;
        }

        if resp.payload.is_empty() {
            return;
        }

        let list: SeriesList = match serde_json::from_slice(&resp.payload) {
            Ok(list) => list,
            Err(e) => {
                self.fail(JobError::Payload(e.to_string())).await;
                return;
            }
        };

        let poisoned = match self.aggregator.lock() {
            Ok(mut aggregator) => {
                for series in &list.series {
                    aggregator.aggregate(series);
                }
                None
            }
            Err(e) => Some(e.to_string()),
        };
        if let Some(message) = poisoned {
            self.fail(JobError::Payload(message)).await;
        }
    }

    async fn finish(&self) {
        if self.cancel.is_cancelled() {
            tracing::debug!("Job cancelled, result discarded");
            return;
        }
        if self.failed.load(Ordering::SeqCst) {
            return;
        }

        let result = match self.aggregator.lock() {
            Ok(aggregator) => Ok(aggregator.result_set()),
            Err(e) => Err(JobError::Payload(e.to_string())),
        };
        if self.result_tx.send(result).await.is_err() {
            tracing::debug!("Result receiver dropped before result delivery");
        }
    }
}

/// Merger for metadata suggestion queries
pub struct SuggestResultMerger {
    result_tx: SuggestSender,
    cancel: CancellationToken,
}

impl SuggestResultMerger {
    pub fn new(result_tx: SuggestSender, cancel: CancellationToken) -> Self {
        Self { result_tx, cancel }
    }
}

#[async_trait]
impl ResultMerger for SuggestResultMerger {
    async fn merge(&self, resp: TaskResponse) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(message) = resp.error {
            tracing::warn!(job_id = resp.job_id, node = %resp.send_node, error = %message, "Metadata sub-task failed");
            return;
        }
        if resp.payload.is_empty() {
            return;
        }

        match serde_json::from_slice::<Vec<String>>(&resp.payload) {
            Ok(values) => {
                if self.result_tx.send(values).await.is_err() {
                    tracing::debug!("Suggest receiver dropped");
                }
            }
            Err(e) => {
                tracing::warn!(job_id = resp.job_id, error = %e, "Invalid suggest payload dropped");
            }
        }
    }

    async fn finish(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{AggregatorSpec, TimeSeries};
    use crate::models::NodeIndicator;
    use crate::query::TimeRange;

    fn payload(series: Vec<TimeSeries>) -> Vec<u8> {
        serde_json::to_vec(&SeriesList { series }).unwrap()
    }

    fn grouping(tx: ResultSender, cancel: CancellationToken) -> GroupingResultMerger {
        let aggregator = GroupingAggregator::new(
            10,
            TimeRange::new(0, 99),
            vec![AggregatorSpec::new("usage")],
        );
        GroupingResultMerger::new(aggregator, tx, cancel)
    }

    #[tokio::test]
    async fn test_grouping_merges_then_sends_once() {
        let (tx, mut rx) = mpsc::channel(4);
        let merger = grouping(tx, CancellationToken::new());
        let node = NodeIndicator::from("storage-1");

        merger
            .merge(TaskResponse::completed(
                1,
                "t",
                node.clone(),
                payload(vec![TimeSeries::new().tag("host", "a").field("usage", vec![(1, 1.0)])]),
            ))
            .await;
        merger
            .merge(TaskResponse::completed(
                1,
                "t",
                node,
                payload(vec![TimeSeries::new().tag("host", "a").field("usage", vec![(2, 2.0)])]),
            ))
            .await;
        assert!(rx.try_recv().is_err());

        merger.finish().await;
        let result = rx.recv().await.unwrap().unwrap();
        assert_eq!(result.series[0].fields["usage"], vec![(0, 3.0)]);
    }

    #[tokio::test]
    async fn test_grouping_reports_remote_failure() {
        let (tx, mut rx) = mpsc::channel(4);
        let merger = grouping(tx, CancellationToken::new());

        merger
            .merge(TaskResponse::failed(1, "t", "storage-2".into(), "shard offline"))
            .await;
        merger.finish().await;

        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, JobError::TaskFailed { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_grouping_bad_payload() {
        let (tx, mut rx) = mpsc::channel(4);
        let merger = grouping(tx, CancellationToken::new());

        merger
            .merge(TaskResponse::completed(1, "t", "storage-1".into(), b"not json".to_vec()))
            .await;
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, JobError::Payload(_)));
    }

    #[tokio::test]
    async fn test_grouping_stops_after_cancel() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let merger = grouping(tx, cancel.clone());

        cancel.cancel();
        merger.finish().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_suggest_forwards_values() {
        let (tx, mut rx) = mpsc::channel(4);
        let merger = SuggestResultMerger::new(tx, CancellationToken::new());

        let values = serde_json::to_vec(&vec!["web-1", "web-2"]).unwrap();
        merger
            .merge(TaskResponse::completed(1, "t", "storage-1".into(), values))
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            vec!["web-1".to_string(), "web-2".to_string()]
        );
    }
}
