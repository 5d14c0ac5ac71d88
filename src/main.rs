//! Chronicle Cluster Node
//!
//! Runs a broker together with in-process storage nodes connected by a
//! loopback transport, ingests a demo metric and answers one data query and
//! one tag value suggestion across the cluster.

use anyhow::Context;
use async_trait::async_trait;
use chronicle_cluster::config::generate_default_config;
use chronicle_cluster::*;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const NAMESPACE: &str = "demo";
const METRIC: &str = "cpu";
const FIELD: &str = "usage";

#[derive(Parser, Debug)]
#[command(name = "chronicle-node", version, about = "Chronicle cluster node")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of in-process storage nodes
    #[arg(long, default_value_t = 3)]
    leafs: usize,

    /// Host pattern the demo query filters on
    #[arg(long, default_value = "web-*")]
    hosts: String,

    /// Hours of demo data written per host
    #[arg(long, default_value_t = 2)]
    hours: i64,

    /// Aggregation applied per bucket by the demo query
    #[arg(long, default_value = "avg")]
    func: AggregationFunc,

    /// Print the default config and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_tracing(&config.logging);

    tracing::info!(
        node = %config.coordinator.node_id,
        leafs = cli.leafs,
        "Chronicle cluster node v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Storage nodes
    let now = chrono::Utc::now().timestamp_millis();
    let mut nodes = HashMap::new();
    for i in 1..=cli.leafs {
        let indicator = NodeIndicator::new(format!("storage-{}", i));
        let node = StorageNode::ingest(indicator, i, now, cli.hours, &config.memdb)?;
        nodes.insert(node.indicator.clone(), node);
    }

    // Broker
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(LoopbackTransport { requests: request_tx });
    let task_manager = Arc::new(DefaultTaskManager::new(
        config.coordinator.node_id.as_str().into(),
        transport,
    ));
    let jobs = JobManager::with_config(
        Arc::clone(&task_manager) as Arc<dyn TaskManager>,
        config.coordinator.clone(),
    );

    let server = tokio::spawn(serve(
        Arc::new(nodes),
        request_rx,
        Arc::clone(&task_manager),
    ));

    let plan = demo_plan(&config.coordinator.node_id, cli.leafs);
    demo_query(&jobs, &config, plan.clone(), now, cli.hours, &cli.hosts, cli.func).await?;
    demo_suggest(&jobs, &config, plan, cli.leafs).await?;

    tracing::info!(jobs = jobs.job_count(), "Shutting down...");
    drop(jobs);
    server.abort();

    tracing::info!("Chronicle cluster node shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "chronicle_cluster={0},chronicle_node={0}",
            logging.level
        ))
    });
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn demo_plan(broker: &str, leafs: usize) -> PhysicalPlan {
    let broker = NodeIndicator::from(broker);
    (1..=leafs).fold(
        PhysicalPlan::new(
            "demo",
            Root {
                indicator: broker.clone(),
                num_of_task: leafs,
            },
        ),
        |plan, i| {
            plan.leaf(Leaf {
                indicator: NodeIndicator::new(format!("storage-{}", i)),
                parent: broker.clone(),
                shard_ids: vec![i as u32],
            })
        },
    )
}

async fn demo_query(
    jobs: &JobManager,
    config: &Config,
    plan: PhysicalPlan,
    now: i64,
    hours: i64,
    hosts: &str,
    func: AggregationFunc,
) -> anyhow::Result<()> {
    let query = Query::new(
        NAMESPACE,
        METRIC,
        &[FIELD],
        TimeRange::new(now - hours * 3_600_000, now),
        config.memdb.family_duration_ms,
    )
    .condition(Expr::tag(TagFilter::like("host", hosts)))
    .field_func(FIELD, func)
    .group_by(&["host"]);

    let (tx, mut rx) = mpsc::channel(config.coordinator.result_channel_capacity);
    let job_id = jobs
        .submit_job(JobContext::query(plan, query, tx, CancellationToken::new()))
        .await?;
    tracing::info!(job_id, func = %func, "Query job submitted");

    let result = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .context("query timed out")?
        .context("result channel closed")??;

    for series in &result.series {
        let points = series.fields.get(FIELD).map(Vec::len).unwrap_or(0);
        tracing::info!(tags = ?series.tags, buckets = points, "Series");
        for (ts, value) in series.fields.get(FIELD).into_iter().flatten() {
            println!("{:?} {} {:.2}", series.tags, ts, value);
        }
    }
    jobs.remove_job(job_id);
    Ok(())
}

async fn demo_suggest(
    jobs: &JobManager,
    config: &Config,
    plan: PhysicalPlan,
    leafs: usize,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(config.coordinator.result_channel_capacity);
    let stmt = MetadataStmt::tag_values(NAMESPACE, METRIC, "host").limit(10);
    let job_id = jobs
        .submit_metadata_job(CancellationToken::new(), plan, stmt, tx)
        .await?;

    let mut values = Vec::new();
    for _ in 0..leafs {
        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .context("suggestion timed out")?
            .context("suggestion channel closed")?;
        values.extend(batch);
    }
    values.sort();
    values.dedup();

    tracing::info!(job_id, count = values.len(), "Tag value suggestions");
    println!("host values: {}", values.join(", "));
    jobs.remove_job(job_id);
    Ok(())
}

/// Transport handing requests to the in-process storage nodes
struct LoopbackTransport {
    requests: mpsc::UnboundedSender<(NodeIndicator, TaskRequest)>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, target: &NodeIndicator, req: &TaskRequest) -> Result<(), TransportError> {
        self.requests
            .send((target.clone(), req.clone()))
            .map_err(|_| TransportError::Closed)
    }

    async fn cancel(
        &self,
        target: &NodeIndicator,
        job_id: JobId,
        _parent_task_id: &str,
    ) -> Result<(), TransportError> {
        tracing::info!(job_id, node = %target, "Cancel requested");
        Ok(())
    }
}

/// In-process storage node: a tag index and flushed field tables per host
struct StorageNode {
    indicator: NodeIndicator,
    index: TagIndex,
    /// (host, tag value ID, flushed points)
    tables: Vec<(String, u32, Vec<(i64, f64)>)>,
}

impl StorageNode {
    /// Write `hours` of points for two hosts and flush every family window
    fn ingest(
        indicator: NodeIndicator,
        ordinal: usize,
        now: i64,
        hours: i64,
        memdb: &MemDbConfig,
    ) -> anyhow::Result<Self> {
        let index = TagIndex::new();
        let mut tables = Vec::new();

        for host in [format!("web-{}", ordinal), format!("db-{}", ordinal)] {
            let (_, value_id) = index.register(NAMESPACE, METRIC, "host", &host)?;
            let mut store = FieldStore::new(FIELD, 1, FieldType::Sum);

            let count = hours * 3_600_000 / memdb.interval_ms.max(1);
            for k in 0..count {
                let ts = now - k * memdb.interval_ms;
                let Some(ctx) = WriteContext::for_timestamp(ts, memdb.interval_ms, memdb.family_duration_ms) else {
                    continue;
                };
                let value = (ordinal as f64) * 10.0 + (k % 60) as f64;
                store.write(&Field::new(FIELD, FieldValue::Sum(value)), ctx);
            }

            let mut flusher = MemoryTableFlusher::new();
            for family_time in store.family_times() {
                store.flush_field_to(&mut flusher, family_time);
            }

            let mut points = Vec::new();
            for flushed in flusher.drain() {
                let block = memdb::decode_segment(&flushed.data)?;
                points.extend(block.values.iter().map(|&(slot, value)| {
                    (block.family_time + i64::from(slot) * memdb.interval_ms, value)
                }));
            }
            tracing::debug!(node = %indicator, host = %host, points = points.len(), "Host ingested");
            tables.push((host, value_id, points));
        }

        Ok(Self {
            indicator,
            index,
            tables,
        })
    }

    fn execute_query(&self, query: &Query) -> anyhow::Result<SeriesList> {
        let matched = TagSearch::new(
            &query.namespace,
            &query.metric_name,
            query.condition.as_ref(),
            &self.index,
        )
        .filter()?;

        let selected: Option<roaring::RoaringBitmap> = query.condition.as_ref().map(|_| {
            matched
                .values()
                .fold(roaring::RoaringBitmap::new(), |acc, r| acc | &r.tag_value_ids)
        });

        let series = self
            .tables
            .iter()
            .filter(|(_, value_id, _)| selected.as_ref().map_or(true, |ids| ids.contains(*value_id)))
            .map(|(host, _, points)| {
                let points = points
                    .iter()
                    .copied()
                    .filter(|(ts, _)| query.time_range.contains(*ts))
                    .collect();
                TimeSeries::new().tag("host", host.as_str()).field(FIELD, points)
            })
            .collect();

        Ok(SeriesList { series })
    }

    fn execute_metadata(&self, stmt: &MetadataStmt) -> anyhow::Result<Vec<String>> {
        match stmt.metadata_type {
            MetadataType::TagValue => {
                let key_id =
                    self.index
                        .get_tag_key_id(&stmt.namespace, &stmt.metric_name, &stmt.tag_key)?;
                Ok(self.index.suggest_tag_values(key_id, &stmt.prefix, stmt.limit)?)
            }
            MetadataType::TagKey => Ok(self
                .index
                .get_keys(&stmt.namespace, &stmt.metric_name)?
                .into_iter()
                .filter(|key| key.starts_with(&stmt.prefix))
                .take(stmt.limit)
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn handle(&self, req: &TaskRequest) -> anyhow::Result<Vec<u8>> {
        let payload = match req.request_type {
            RequestType::Query => {
                let query: Query = serde_json::from_slice(&req.payload)?;
                serde_json::to_vec(&self.execute_query(&query)?)?
            }
            RequestType::Metadata => {
                let stmt: MetadataStmt = serde_json::from_slice(&req.payload)?;
                serde_json::to_vec(&self.execute_metadata(&stmt)?)?
            }
        };
        Ok(payload)
    }
}

/// Answer requests on behalf of the storage nodes
async fn serve(
    nodes: Arc<HashMap<NodeIndicator, StorageNode>>,
    mut requests: mpsc::UnboundedReceiver<(NodeIndicator, TaskRequest)>,
    task_manager: Arc<DefaultTaskManager>,
) {
    while let Some((target, req)) = requests.recv().await {
        let resp = match nodes.get(&target) {
            Some(node) => match node.handle(&req) {
                Ok(payload) => {
                    TaskResponse::completed(req.job_id, req.parent_task_id.clone(), target, payload)
                }
                Err(e) => TaskResponse::failed(req.job_id, req.parent_task_id.clone(), target, e.to_string()),
            },
            None => TaskResponse::failed(
                req.job_id,
                req.parent_task_id.clone(),
                target.clone(),
                format!("unknown node {}", target),
            ),
        };
        task_manager.receive(resp).await;
    }
}
