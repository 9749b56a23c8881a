//! Span repository
//!
//! Batch writes for decoded spans, the keyset fetch the enricher paginates
//! with, windowed reads for session materialization, and service discovery.

use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::ConditionBuilder;
use crate::data::clickhouse::ClickhouseError;
use crate::data::clickhouse::schema::TRACES_TABLE;
use crate::data::types::{AttrMap, EnricherWatermark, SpanRecord};
use crate::utils::time::unix_nanos;

/// Full row shape of `otel_traces`. Events and links are flattened into
/// parallel arrays; event timestamps travel as raw DateTime64(9) ticks.
#[derive(Debug, Row, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TraceRow {
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    pub timestamp: OffsetDateTime,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub trace_state: String,
    pub span_name: String,
    pub span_kind: String,
    pub service_name: String,
    pub resource_attributes: AttrMap,
    pub scope_name: String,
    pub scope_version: String,
    pub span_attributes: AttrMap,
    pub duration: u64,
    pub status_code: String,
    pub status_message: String,
    pub event_timestamps: Vec<i64>,
    pub event_names: Vec<String>,
    pub event_attributes: Vec<AttrMap>,
    pub link_trace_ids: Vec<String>,
    pub link_span_ids: Vec<String>,
    pub link_trace_states: Vec<String>,
    pub link_attributes: Vec<AttrMap>,
}

impl From<&SpanRecord> for TraceRow {
    fn from(span: &SpanRecord) -> Self {
        Self {
            timestamp: span.timestamp,
            trace_id: span.trace_id.clone(),
            span_id: span.span_id.clone(),
            parent_span_id: span.parent_span_id.clone(),
            trace_state: span.trace_state.clone(),
            span_name: span.span_name.clone(),
            span_kind: span.span_kind.as_str().to_string(),
            service_name: span.service_name.clone(),
            resource_attributes: span.resource_attributes.clone(),
            scope_name: span.scope_name.clone(),
            scope_version: span.scope_version.clone(),
            span_attributes: span.span_attributes.clone(),
            duration: span.duration_ns,
            status_code: span.status_code.as_str().to_string(),
            status_message: span.status_message.clone(),
            event_timestamps: span.events.iter().map(|e| unix_nanos(e.timestamp)).collect(),
            event_names: span.events.iter().map(|e| e.name.clone()).collect(),
            event_attributes: span.events.iter().map(|e| e.attributes.clone()).collect(),
            link_trace_ids: span.links.iter().map(|l| l.trace_id.clone()).collect(),
            link_span_ids: span.links.iter().map(|l| l.span_id.clone()).collect(),
            link_trace_states: span.links.iter().map(|l| l.trace_state.clone()).collect(),
            link_attributes: span.links.iter().map(|l| l.attributes.clone()).collect(),
        }
    }
}

const TRACE_COLUMNS: &str = "Timestamp, TraceId, SpanId, ParentSpanId, TraceState, \
     SpanName, SpanKind, ServiceName, ResourceAttributes, ScopeName, ScopeVersion, \
     SpanAttributes, Duration, StatusCode, StatusMessage, \
     EventTimestamps, EventNames, EventAttributes, \
     LinkTraceIds, LinkSpanIds, LinkTraceStates, LinkAttributes";

/// Columns the enricher reads past the watermark
#[derive(Debug, Clone, Row, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpanSliceRow {
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    pub timestamp: OffsetDateTime,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub span_name: String,
    pub span_kind: String,
    pub service_name: String,
    pub duration: u64,
    pub status_code: String,
    pub status_message: String,
    pub resource_attributes: AttrMap,
    pub span_attributes: AttrMap,
}

/// Insert a batch of spans
pub async fn insert_batch(client: &Client, spans: &[SpanRecord]) -> Result<(), ClickhouseError> {
    if spans.is_empty() {
        return Ok(());
    }

    let mut insert: clickhouse::insert::Insert<TraceRow> = client.insert(TRACES_TABLE).await?;
    for span in spans {
        let row = TraceRow::from(span);
        insert.write(&row).await?;
    }
    insert.end().await?;
    Ok(())
}

/// Fetch the next contiguous slice of spans strictly past the watermark,
/// in `(Timestamp, SpanId)` order.
pub async fn fetch_slice_after(
    client: &Client,
    watermark: &EnricherWatermark,
    limit: u32,
) -> Result<Vec<SpanSliceRow>, ClickhouseError> {
    let rows = client
        .query(
            "SELECT Timestamp, TraceId, SpanId, ParentSpanId, SpanName, SpanKind, \
             ServiceName, Duration, StatusCode, StatusMessage, ResourceAttributes, SpanAttributes \
             FROM otel_traces \
             WHERE (Timestamp, SpanId) > (fromUnixTimestamp64Nano(?), ?) \
             ORDER BY Timestamp, SpanId \
             LIMIT ?",
        )
        .bind(unix_nanos(watermark.last_timestamp))
        .bind(&watermark.last_span_id)
        .bind(limit)
        .fetch_all::<SpanSliceRow>()
        .await?;
    Ok(rows)
}

/// Fetch spans inside an inclusive time window, optionally filtered by
/// service, ordered by timestamp ascending and capped at `limit`.
pub async fn fetch_window(
    client: &Client,
    services: &[String],
    start: OffsetDateTime,
    end: OffsetDateTime,
    limit: u64,
) -> Result<Vec<TraceRow>, ClickhouseError> {
    let mut builder = ConditionBuilder::new();
    builder.add_timestamp_gte("Timestamp", start);
    builder.add_timestamp_lte("Timestamp", end);
    builder.add_in("ServiceName", services);

    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY Timestamp ASC LIMIT ?",
        TRACE_COLUMNS,
        TRACES_TABLE,
        builder.build()
    );

    let query = builder.bind_to(client.query(&sql)).bind(limit);
    let rows = query.fetch_all::<TraceRow>().await?;
    Ok(rows)
}

/// Distinct service names observed in the span table
pub async fn list_services(client: &Client) -> Result<Vec<String>, ClickhouseError> {
    let services = client
        .query("SELECT DISTINCT ServiceName FROM otel_traces ORDER BY ServiceName")
        .fetch_all::<String>()
        .await?;
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{SpanEvent, SpanKind, SpanLink, StatusCode};
    use crate::utils::time::datetime_from_unix_nanos;

    fn make_span() -> SpanRecord {
        SpanRecord {
            timestamp: datetime_from_unix_nanos(1_700_000_000_000_000_000),
            trace_id: "aaaabbbbccccddddeeeeffff00001111".to_string(),
            span_id: "0102030405060708".to_string(),
            parent_span_id: String::new(),
            trace_state: String::new(),
            span_name: "checkout".to_string(),
            span_kind: SpanKind::Server,
            service_name: "storefront".to_string(),
            resource_attributes: vec![("service.name".to_string(), "storefront".to_string())],
            scope_name: "manual".to_string(),
            scope_version: "1.0".to_string(),
            span_attributes: vec![("http.method".to_string(), "POST".to_string())],
            duration_ns: 12_500_000,
            status_code: StatusCode::Ok,
            status_message: String::new(),
            events: vec![SpanEvent {
                timestamp: datetime_from_unix_nanos(1_700_000_000_001_000_000),
                name: "cart.checked".to_string(),
                attributes: vec![],
            }],
            links: vec![SpanLink {
                trace_id: "11112222333344445555666677778888".to_string(),
                span_id: "1112131415161718".to_string(),
                trace_state: String::new(),
                attributes: vec![],
            }],
        }
    }

    #[test]
    fn test_trace_row_from_record() {
        let span = make_span();
        let row = TraceRow::from(&span);
        assert_eq!(row.trace_id, span.trace_id);
        assert_eq!(row.span_kind, "SERVER");
        assert_eq!(row.status_code, "OK");
        assert_eq!(row.duration, 12_500_000);
        assert_eq!(row.event_names, vec!["cart.checked".to_string()]);
        assert_eq!(row.event_timestamps, vec![1_700_000_000_001_000_000]);
        assert_eq!(
            row.link_trace_ids,
            vec!["11112222333344445555666677778888".to_string()]
        );
    }

    #[test]
    fn test_root_span_has_empty_parent() {
        let row = TraceRow::from(&make_span());
        assert!(row.parent_span_id.is_empty());
    }
}
