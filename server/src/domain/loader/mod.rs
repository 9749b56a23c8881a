//! Object-store loader
//!
//! Pumps OTLP JSON files from the bucket into the warehouse, one independent
//! pipeline per signal:
//!
//! ```text
//! LoaderService
//! ├── SignalPipeline<TracesSignal>   ── W workers ── download + decode ── otel_traces
//! ├── SignalPipeline<LogsSignal>     ── W workers ── download + decode ── otel_logs
//! └── SignalPipeline<MetricsSignal>  ── W workers ── download + decode ── otel_metrics
//! ```
//!
//! Each pipeline polls adaptively (fast when busy, slow when idle) and
//! tracks progress in its own file watermark table.

pub mod decode;
pub mod pipeline;

pub use pipeline::LoaderError;

use clickhouse::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::{LoaderConfig, S3Config};
use crate::data::clickhouse::repositories::{log, metric, span};
use crate::data::clickhouse::schema::{
    LOGS_WATERMARK_TABLE, METRICS_WATERMARK_TABLE, TRACES_WATERMARK_TABLE,
};
use crate::data::clickhouse::{ClickhouseError, ClickhouseService};
use crate::data::objectstore::ObjectStore;
use crate::data::types::{LogRecord, MetricRecord, Signal, SpanRecord};
use pipeline::{SignalPipeline, SignalSpec};

struct TracesSignal;

impl SignalSpec for TracesSignal {
    type Row = SpanRecord;

    const SIGNAL: Signal = Signal::Traces;
    const ROW_LABEL: &'static str = "spans";
    const WATERMARK_TABLE: &'static str = TRACES_WATERMARK_TABLE;

    fn decode(raw: &str) -> Result<Vec<Self::Row>, serde_json::Error> {
        decode::decode_traces(raw)
    }

    fn insert(
        client: &Client,
        rows: &[Self::Row],
    ) -> impl Future<Output = Result<(), ClickhouseError>> + Send {
        span::insert_batch(client, rows)
    }
}

struct LogsSignal;

impl SignalSpec for LogsSignal {
    type Row = LogRecord;

    const SIGNAL: Signal = Signal::Logs;
    const ROW_LABEL: &'static str = "log records";
    const WATERMARK_TABLE: &'static str = LOGS_WATERMARK_TABLE;

    fn decode(raw: &str) -> Result<Vec<Self::Row>, serde_json::Error> {
        decode::decode_logs(raw)
    }

    fn insert(
        client: &Client,
        rows: &[Self::Row],
    ) -> impl Future<Output = Result<(), ClickhouseError>> + Send {
        log::insert_batch(client, rows)
    }
}

struct MetricsSignal;

impl SignalSpec for MetricsSignal {
    type Row = MetricRecord;

    const SIGNAL: Signal = Signal::Metrics;
    const ROW_LABEL: &'static str = "data points";
    const WATERMARK_TABLE: &'static str = METRICS_WATERMARK_TABLE;

    fn decode(raw: &str) -> Result<Vec<Self::Row>, serde_json::Error> {
        decode::decode_metrics(raw)
    }

    fn insert(
        client: &Client,
        rows: &[Self::Row],
    ) -> impl Future<Output = Result<(), ClickhouseError>> + Send {
        metric::insert_batch(client, rows)
    }
}

/// Spawns and owns the three signal pipelines
pub struct LoaderService {
    client: Client,
    store: ObjectStore,
    s3: S3Config,
    config: LoaderConfig,
}

impl LoaderService {
    pub fn new(
        warehouse: &ClickhouseService,
        store: ObjectStore,
        s3: S3Config,
        config: LoaderConfig,
    ) -> Self {
        Self {
            client: warehouse.client().clone(),
            store,
            s3,
            config,
        }
    }

    /// Start one pipeline task per signal. Each task owns client clones and
    /// finishes its current batch on shutdown.
    pub fn start(&self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            bucket = %self.s3.bucket,
            traces_prefix = %self.s3.traces_prefix,
            logs_prefix = %self.s3.logs_prefix,
            metrics_prefix = %self.s3.metrics_prefix,
            batch_size = self.config.batch_size,
            file_workers = self.config.max_file_workers,
            poll_busy_ms = self.config.poll_busy.as_millis() as u64,
            poll_idle_ms = self.config.poll_idle.as_millis() as u64,
            "Loader starting"
        );

        let traces = SignalPipeline::<TracesSignal>::new(
            self.store.clone(),
            self.client.clone(),
            self.s3.traces_prefix.clone(),
            self.config.clone(),
        );
        let logs = SignalPipeline::<LogsSignal>::new(
            self.store.clone(),
            self.client.clone(),
            self.s3.logs_prefix.clone(),
            self.config.clone(),
        );
        let metrics = SignalPipeline::<MetricsSignal>::new(
            self.store.clone(),
            self.client.clone(),
            self.s3.metrics_prefix.clone(),
            self.config.clone(),
        );

        vec![
            tokio::spawn(traces.run(shutdown_rx.clone())),
            tokio::spawn(logs.run(shutdown_rx.clone())),
            tokio::spawn(metrics.run(shutdown_rx)),
        ]
    }
}
