//! Log repository

use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::ConditionBuilder;
use crate::data::clickhouse::ClickhouseError;
use crate::data::clickhouse::schema::LOGS_TABLE;
use crate::data::types::{AttrMap, LogRecord};

/// Full row shape of `otel_logs`
#[derive(Debug, Row, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogRow {
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    pub timestamp: OffsetDateTime,
    pub trace_id: String,
    pub span_id: String,
    pub severity_number: u8,
    pub severity_text: String,
    pub body: String,
    pub service_name: String,
    pub resource_attributes: AttrMap,
    pub log_attributes: AttrMap,
}

impl From<&LogRecord> for LogRow {
    fn from(log: &LogRecord) -> Self {
        Self {
            timestamp: log.timestamp,
            trace_id: log.trace_id.clone(),
            span_id: log.span_id.clone(),
            severity_number: log.severity_number,
            severity_text: log.severity_text.clone(),
            body: log.body.clone(),
            service_name: log.service_name.clone(),
            resource_attributes: log.resource_attributes.clone(),
            log_attributes: log.log_attributes.clone(),
        }
    }
}

const LOG_COLUMNS: &str = "Timestamp, TraceId, SpanId, SeverityNumber, SeverityText, \
     Body, ServiceName, ResourceAttributes, LogAttributes";

/// Insert a batch of log records
pub async fn insert_batch(client: &Client, logs: &[LogRecord]) -> Result<(), ClickhouseError> {
    if logs.is_empty() {
        return Ok(());
    }

    let mut insert: clickhouse::insert::Insert<LogRow> = client.insert(LOGS_TABLE).await?;
    for log in logs {
        let row = LogRow::from(log);
        insert.write(&row).await?;
    }
    insert.end().await?;
    Ok(())
}

/// Fetch log records inside an inclusive time window, optionally filtered
/// by service, ordered by timestamp ascending and capped at `limit`.
pub async fn fetch_window(
    client: &Client,
    services: &[String],
    start: OffsetDateTime,
    end: OffsetDateTime,
    limit: u64,
) -> Result<Vec<LogRow>, ClickhouseError> {
    let mut builder = ConditionBuilder::new();
    builder.add_timestamp_gte("Timestamp", start);
    builder.add_timestamp_lte("Timestamp", end);
    builder.add_in("ServiceName", services);

    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY Timestamp ASC LIMIT ?",
        LOG_COLUMNS,
        LOGS_TABLE,
        builder.build()
    );

    let query = builder.bind_to(client.query(&sql)).bind(limit);
    let rows = query.fetch_all::<LogRow>().await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::datetime_from_unix_nanos;

    #[test]
    fn test_log_row_from_record() {
        let record = LogRecord {
            timestamp: datetime_from_unix_nanos(1_700_000_000_000_000_000),
            trace_id: "aaaabbbbccccddddeeeeffff00001111".to_string(),
            span_id: "0102030405060708".to_string(),
            severity_number: 17,
            severity_text: "ERROR".to_string(),
            body: "payment declined".to_string(),
            service_name: "payments".to_string(),
            resource_attributes: vec![("service.name".to_string(), "payments".to_string())],
            log_attributes: vec![("order.id".to_string(), "o-17".to_string())],
        };
        let row = LogRow::from(&record);
        assert_eq!(row.severity_number, 17);
        assert_eq!(row.severity_text, "ERROR");
        assert_eq!(row.body, "payment declined");
    }
}
