//! Enriched span repository
//!
//! The enriched mirror is append-only; duplicate keys can appear after a
//! crash between insert and watermark advance. Consumers deduplicate on
//! `(Timestamp, SpanId)`.

use clickhouse::{Client, Row};
use serde::Serialize;
use time::OffsetDateTime;

use crate::data::clickhouse::ClickhouseError;
use crate::data::clickhouse::schema::TRACES_ENRICHED_TABLE;
use crate::data::types::{AttrMap, EnrichedSpan};

#[derive(Debug, Row, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EnrichedRow {
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    timestamp: OffsetDateTime,
    trace_id: String,
    span_id: String,
    parent_span_id: String,
    span_name: String,
    span_kind: String,
    service_name: String,
    duration: u64,
    status_code: String,
    status_message: String,
    resource_attributes: AttrMap,
    span_attributes: AttrMap,
    embedding_text: String,
    embedding: Vec<f32>,
}

impl From<&EnrichedSpan> for EnrichedRow {
    fn from(span: &EnrichedSpan) -> Self {
        Self {
            timestamp: span.timestamp,
            trace_id: span.trace_id.clone(),
            span_id: span.span_id.clone(),
            parent_span_id: span.parent_span_id.clone(),
            span_name: span.span_name.clone(),
            span_kind: span.span_kind.clone(),
            service_name: span.service_name.clone(),
            duration: span.duration_ns,
            status_code: span.status_code.clone(),
            status_message: span.status_message.clone(),
            resource_attributes: span.resource_attributes.clone(),
            span_attributes: span.span_attributes.clone(),
            embedding_text: span.embedding_text.clone(),
            embedding: span.embedding.clone(),
        }
    }
}

/// Insert a batch of enriched spans
pub async fn insert_batch(client: &Client, spans: &[EnrichedSpan]) -> Result<(), ClickhouseError> {
    if spans.is_empty() {
        return Ok(());
    }

    let mut insert: clickhouse::insert::Insert<EnrichedRow> =
        client.insert(TRACES_ENRICHED_TABLE).await?;
    for span in spans {
        let row = EnrichedRow::from(span);
        insert.write(&row).await?;
    }
    insert.end().await?;
    Ok(())
}
