//! Per-signal loader pipeline
//!
//! Each signal runs one long-lived task: poll the watermark table and the
//! object store, diff, fan out download+decode over a bounded worker pool,
//! then insert rows and record watermarks serially in completion order.
//! A file is recorded exactly once per pass: `done` with its row count, or
//! `failed` with the error; `failed` entries count as processed and are not
//! retried.

use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;

use clickhouse::Client;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::watch;

use crate::core::config::LoaderConfig;
use crate::data::clickhouse::ClickhouseError;
use crate::data::clickhouse::repositories::watermark;
use crate::data::objectstore::{ObjectStore, ObjectStoreError};
use crate::data::types::{FileStatus, Signal};
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, retry_with_backoff};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Warehouse(#[from] ClickhouseError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
}

/// Static description of one signal pipeline: which tables it writes, and
/// how its files decode and insert.
pub(crate) trait SignalSpec: Send + Sync + 'static {
    type Row: Send + Sync;

    const SIGNAL: Signal;
    /// Unit used in log lines ("spans", "log records", "data points")
    const ROW_LABEL: &'static str;
    const WATERMARK_TABLE: &'static str;

    fn decode(raw: &str) -> Result<Vec<Self::Row>, serde_json::Error>;

    fn insert(
        client: &Client,
        rows: &[Self::Row],
    ) -> impl Future<Output = Result<(), ClickhouseError>> + Send;
}

/// One signal's poll/download/insert loop. Owns its own warehouse and
/// object-store clients.
pub(crate) struct SignalPipeline<S: SignalSpec> {
    store: ObjectStore,
    client: Client,
    prefix: String,
    config: LoaderConfig,
    _spec: PhantomData<S>,
}

impl<S: SignalSpec> SignalPipeline<S> {
    pub fn new(store: ObjectStore, client: Client, prefix: String, config: LoaderConfig) -> Self {
        Self {
            store,
            client,
            prefix,
            config,
            _spec: PhantomData,
        }
    }

    /// Continuous polling loop. Completes the current batch on shutdown.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(signal = %S::SIGNAL, prefix = %self.prefix, "Signal pipeline starting");

        loop {
            let sleep = match self.poll_cycle().await {
                Ok(0) => self.config.poll_idle,
                Ok(files) => {
                    tracing::debug!(signal = %S::SIGNAL, files, "Cycle complete");
                    self.config.poll_busy
                }
                Err(e) => {
                    tracing::error!(signal = %S::SIGNAL, error = %e, "Poll cycle error");
                    self.config.poll_idle
                }
            };

            tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|&v| v) => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        tracing::debug!(signal = %S::SIGNAL, "Signal pipeline shutdown complete");
    }

    /// One poll cycle: list, diff against the watermark table, process new
    /// files. Returns the number of files handled this cycle.
    async fn poll_cycle(&self) -> Result<usize, LoaderError> {
        let processed: HashSet<String> =
            watermark::processed_files(&self.client, S::WATERMARK_TABLE).await?;
        let all_files = self.store.list_json_objects(&self.prefix).await?;

        let mut new_files: Vec<String> = all_files
            .iter()
            .filter(|key| !processed.contains(*key))
            .cloned()
            .collect();

        if new_files.is_empty() {
            return Ok(0);
        }
        new_files.sort();

        tracing::info!(
            signal = %S::SIGNAL,
            new = new_files.len(),
            total = all_files.len(),
            "Found new files"
        );

        let file_count = new_files.len();
        let total_rows = self.process_files(new_files).await?;

        tracing::info!(
            signal = %S::SIGNAL,
            files = file_count,
            rows = total_rows,
            "Batch complete: {} {} inserted",
            total_rows,
            S::ROW_LABEL
        );

        Ok(file_count)
    }

    /// Download and decode files concurrently; insert rows and record
    /// watermarks serially as downloads complete. Per-file failures are
    /// recorded `failed` and do not stop the batch; a watermark write that
    /// still fails after retries aborts the cycle, since continuing would
    /// leave the file invisible to the next listing diff.
    async fn process_files(&self, files: Vec<String>) -> Result<u64, LoaderError> {
        let mut downloads = futures::stream::iter(files.into_iter().map(|key| {
            let store = self.store.clone();
            async move {
                let result = Self::download_and_decode(&store, &key).await;
                (key, result)
            }
        }))
        .buffer_unordered(self.config.max_file_workers);

        let mut total_rows = 0u64;
        while let Some((key, result)) = downloads.next().await {
            match result {
                Ok(rows) => match self.insert_rows(&rows).await {
                    Ok(()) => {
                        self.record_watermark(&key, FileStatus::Done, rows.len() as u64, "")
                            .await?;
                        total_rows += rows.len() as u64;
                        tracing::info!(
                            signal = %S::SIGNAL,
                            file = %key,
                            rows = rows.len(),
                            "Loaded {} {}",
                            rows.len(),
                            S::ROW_LABEL
                        );
                    }
                    Err(e) => {
                        tracing::error!(signal = %S::SIGNAL, file = %key, error = %e, "Insert failed");
                        self.record_watermark(&key, FileStatus::Failed, 0, &e.to_string())
                            .await?;
                    }
                },
                Err(e) => {
                    tracing::error!(signal = %S::SIGNAL, file = %key, error = %e, "Failed to process file");
                    self.record_watermark(&key, FileStatus::Failed, 0, &e.to_string())
                        .await?;
                }
            }
        }

        Ok(total_rows)
    }

    /// Fetch one object and decode its envelope
    async fn download_and_decode(
        store: &ObjectStore,
        key: &str,
    ) -> Result<Vec<S::Row>, LoaderError> {
        let raw = store.get_object_utf8(key).await?;
        let rows = S::decode(&raw)?;
        Ok(rows)
    }

    /// Insert rows in contiguous batches; the partial tail batch is written
    /// too. An empty file performs no insert but is still recorded `done`.
    async fn insert_rows(&self, rows: &[S::Row]) -> Result<(), ClickhouseError> {
        for chunk in rows.chunks(self.config.batch_size) {
            S::insert(&self.client, chunk).await?;
        }
        Ok(())
    }

    /// Record the file's watermark entry. Retried with backoff: losing the
    /// entry after a successful insert would re-process the file next cycle.
    /// An exhausted retry propagates so the caller treats it as a cycle
    /// error rather than leaving the file permanently unrecorded.
    async fn record_watermark(
        &self,
        key: &str,
        status: FileStatus,
        row_count: u64,
        error_message: &str,
    ) -> Result<(), ClickhouseError> {
        retry_with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY_MS, || {
            watermark::record_file(
                &self.client,
                S::WATERMARK_TABLE,
                key,
                status,
                row_count,
                error_message,
            )
        })
        .await
        .map_err(|(e, attempts)| {
            tracing::error!(
                signal = %S::SIGNAL,
                file = %key,
                error = %e,
                attempts,
                "Failed to record watermark"
            );
            e
        })?;
        Ok(())
    }
}
