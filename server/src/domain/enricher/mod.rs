//! Embedding enricher
//!
//! Mirrors every span into `otel_traces_enriched` with a derived text and
//! its embedding vector, driven by a single monotonic `(Timestamp, SpanId)`
//! watermark:
//!
//! ```text
//! Prefetch task ──bounded queue──▶ Compute task
//!   read watermark                   build texts, encode (sub-batched)
//!   fetch next slice                 insert enriched rows
//!   (blocks when queue full)         advance watermark
//! ```
//!
//! The watermark advances only after a successful insert; a crash mid-cycle
//! re-reads the old watermark, so the enriched table is at-least-once and
//! consumers deduplicate on `(Timestamp, SpanId)`.

pub mod model;

pub use model::{EmbeddingModel, HashEmbedder, ModelError, load_model};

use std::sync::Arc;

use clickhouse::Client;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::config::EnricherConfig;
use crate::core::constants::ENRICHER_QUEUE_DEPTH;
use crate::data::clickhouse::repositories::span::{self, SpanSliceRow};
use crate::data::clickhouse::repositories::{enriched, watermark};
use crate::data::clickhouse::{ClickhouseError, ClickhouseService};
use crate::data::types::{EnrichedSpan, EnricherWatermark};

#[derive(Error, Debug)]
pub enum EnricherError {
    #[error(transparent)]
    Warehouse(#[from] ClickhouseError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Build the text representation of a span for embedding.
///
/// Combines service, span name, kind, status, duration in milliseconds with
/// one decimal place, the status message when present, and every span
/// attribute in decode order. The result is a pure function of the span's
/// core fields.
pub fn build_embedding_text(row: &SpanSliceRow) -> String {
    let mut parts = vec![
        format!("service={}", row.service_name),
        format!("span={}", row.span_name),
        format!("kind={}", row.span_kind),
        format!("status={}", row.status_code),
        format!("duration={:.1}ms", row.duration as f64 / 1_000_000.0),
    ];

    if !row.status_message.is_empty() {
        parts.push(format!("message={}", row.status_message));
    }

    for (key, value) in &row.span_attributes {
        parts.push(format!("{}={}", key, value));
    }

    parts.join(" ")
}

/// Build texts and embeddings for one slice, sub-batching the encode calls
/// for memory pacing.
pub fn encode_slice(
    model: &dyn EmbeddingModel,
    rows: &[SpanSliceRow],
) -> Result<Vec<EnrichedSpan>, ModelError> {
    let texts: Vec<String> = rows.iter().map(build_embedding_text).collect();

    let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(model.batch_size_hint()) {
        embeddings.extend(model.encode(chunk)?);
    }

    Ok(rows
        .iter()
        .zip(texts)
        .zip(embeddings)
        .map(|((row, embedding_text), embedding)| EnrichedSpan {
            timestamp: row.timestamp,
            trace_id: row.trace_id.clone(),
            span_id: row.span_id.clone(),
            parent_span_id: row.parent_span_id.clone(),
            span_name: row.span_name.clone(),
            span_kind: row.span_kind.clone(),
            service_name: row.service_name.clone(),
            duration_ns: row.duration,
            status_code: row.status_code.clone(),
            status_message: row.status_message.clone(),
            resource_attributes: row.resource_attributes.clone(),
            span_attributes: row.span_attributes.clone(),
            embedding_text,
            embedding,
        })
        .collect())
}

/// Prefetch + compute worker pair over the enriched mirror
pub struct EnricherService {
    client: Client,
    config: EnricherConfig,
    model: Arc<dyn EmbeddingModel>,
}

impl EnricherService {
    pub fn new(
        warehouse: &ClickhouseService,
        config: EnricherConfig,
        model: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            client: warehouse.client().clone(),
            config,
            model,
        }
    }

    /// Start the prefetch and compute tasks. Both finish their current
    /// batch on shutdown.
    pub fn start(&self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            model = %self.config.model_name,
            dimension = self.model.dimension(),
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Enricher starting"
        );

        let (tx, rx) = mpsc::channel::<Vec<SpanSliceRow>>(ENRICHER_QUEUE_DEPTH);

        let prefetch = tokio::spawn(prefetch_loop(
            self.client.clone(),
            self.config.clone(),
            tx,
            shutdown_rx.clone(),
        ));
        let compute = tokio::spawn(compute_loop(
            self.client.clone(),
            Arc::clone(&self.model),
            rx,
            shutdown_rx,
        ));

        vec![prefetch, compute]
    }
}

/// Continuously fetch the next slice past the watermark while the compute
/// stage is encoding. The bounded send keeps this at most one batch ahead.
async fn prefetch_loop(
    client: Client,
    config: EnricherConfig,
    tx: mpsc::Sender<Vec<SpanSliceRow>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let slice = fetch_next_slice(&client, config.batch_size).await;

        match slice {
            Ok(rows) if !rows.is_empty() => {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.wait_for(|&v| v) => break,
                    sent = tx.send(rows) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(_) => {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.wait_for(|&v| v) => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Prefetch error");
                tokio::select! {
                    biased;
                    _ = shutdown_rx.wait_for(|&v| v) => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
        }
    }

    tracing::debug!("Enricher prefetch shutdown complete");
}

async fn fetch_next_slice(
    client: &Client,
    batch_size: u32,
) -> Result<Vec<SpanSliceRow>, ClickhouseError> {
    let watermark = watermark::get_enricher_watermark(client).await?;
    span::fetch_slice_after(client, &watermark, batch_size).await
}

/// Encode prefetched slices and advance the watermark. Cycle errors are
/// logged without advancing; the prefetcher re-reads the same slice.
async fn compute_loop(
    client: Client,
    model: Arc<dyn EmbeddingModel>,
    mut rx: mpsc::Receiver<Vec<SpanSliceRow>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let rows = tokio::select! {
            biased;
            _ = shutdown_rx.wait_for(|&v| v) => break,
            received = rx.recv() => match received {
                Some(rows) => rows,
                None => break,
            },
        };

        tracing::info!(rows = rows.len(), "Enriching spans");
        if let Err(e) = enrich_slice(&client, model.as_ref(), &rows).await {
            tracing::error!(error = %e, "Enrichment cycle error");
        }
    }

    tracing::debug!("Enricher compute shutdown complete");
}

/// One enrichment cycle: encode, insert, then advance the watermark to the
/// last row of the slice.
async fn enrich_slice(
    client: &Client,
    model: &dyn EmbeddingModel,
    rows: &[SpanSliceRow],
) -> Result<(), EnricherError> {
    let Some(last) = rows.last() else {
        return Ok(());
    };

    let enriched_rows = encode_slice(model, rows)?;
    enriched::insert_batch(client, &enriched_rows).await?;

    let next = EnricherWatermark {
        last_timestamp: last.timestamp,
        last_span_id: last.span_id.clone(),
    };
    watermark::update_enricher_watermark(client, &next).await?;

    tracing::info!(rows = rows.len(), "Enriched and inserted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::datetime_from_unix_nanos;

    fn make_slice_row(span_id: &str, duration_ns: u64) -> SpanSliceRow {
        SpanSliceRow {
            timestamp: datetime_from_unix_nanos(1_700_000_000_000_000_000),
            trace_id: "aaaabbbbccccddddeeeeffff00001111".to_string(),
            span_id: span_id.to_string(),
            parent_span_id: String::new(),
            span_name: "verify_jwt".to_string(),
            span_kind: "INTERNAL".to_string(),
            service_name: "auth-service".to_string(),
            duration: duration_ns,
            status_code: "OK".to_string(),
            status_message: String::new(),
            resource_attributes: vec![],
            span_attributes: vec![("user.id".to_string(), "u1".to_string())],
        }
    }

    #[test]
    fn test_embedding_text_exact_format() {
        let row = make_slice_row("0000000000000001", 1_500_000);
        assert_eq!(
            build_embedding_text(&row),
            "service=auth-service span=verify_jwt kind=INTERNAL status=OK duration=1.5ms user.id=u1"
        );
    }

    #[test]
    fn test_embedding_text_includes_message_when_present() {
        let mut row = make_slice_row("0000000000000001", 2_000_000);
        row.status_code = "ERROR".to_string();
        row.status_message = "token expired".to_string();
        row.span_attributes.clear();
        assert_eq!(
            build_embedding_text(&row),
            "service=auth-service span=verify_jwt kind=INTERNAL status=ERROR duration=2.0ms message=token expired"
        );
    }

    #[test]
    fn test_embedding_text_attribute_order() {
        let mut row = make_slice_row("0000000000000001", 1_000_000);
        row.span_attributes = vec![
            ("z.last".to_string(), "1".to_string()),
            ("a.first".to_string(), "2".to_string()),
        ];
        let text = build_embedding_text(&row);
        assert!(text.ends_with("z.last=1 a.first=2"));
    }

    #[test]
    fn test_embedding_text_is_deterministic() {
        let row = make_slice_row("0000000000000001", 1_500_000);
        assert_eq!(build_embedding_text(&row), build_embedding_text(&row));
    }

    #[test]
    fn test_encode_slice_shapes_and_determinism() {
        let model = HashEmbedder::new();
        let rows: Vec<SpanSliceRow> = (0..700)
            .map(|i| make_slice_row(&format!("{:016x}", i), 1_000_000))
            .collect();

        let a = encode_slice(&model, &rows).unwrap();
        let b = encode_slice(&model, &rows).unwrap();
        assert_eq!(a.len(), 700);
        assert_eq!(a, b);
        for span in &a {
            assert_eq!(span.embedding.len(), model.dimension());
            assert!(!span.embedding_text.is_empty());
        }
    }

    #[test]
    fn test_encode_slice_keys_match_source() {
        let model = HashEmbedder::new();
        let rows = vec![
            make_slice_row("0000000000000001", 1_000_000),
            make_slice_row("0000000000000002", 2_000_000),
        ];
        let enriched = encode_slice(&model, &rows).unwrap();
        assert_eq!(enriched[0].span_id, "0000000000000001");
        assert_eq!(enriched[1].span_id, "0000000000000002");
        assert_eq!(enriched[0].timestamp, rows[0].timestamp);
    }
}
