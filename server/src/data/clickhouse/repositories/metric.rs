//! Metric repository

use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::ConditionBuilder;
use crate::data::clickhouse::ClickhouseError;
use crate::data::clickhouse::schema::METRICS_TABLE;
use crate::data::types::{AttrMap, MetricRecord};

/// Full row shape of `otel_metrics`
#[derive(Debug, Row, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricRow {
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    pub timestamp: OffsetDateTime,
    pub metric_name: String,
    pub metric_description: String,
    pub metric_unit: String,
    pub metric_type: String,
    pub value: f64,
    pub service_name: String,
    pub resource_attributes: AttrMap,
    pub metric_attributes: AttrMap,
}

impl From<&MetricRecord> for MetricRow {
    fn from(metric: &MetricRecord) -> Self {
        Self {
            timestamp: metric.timestamp,
            metric_name: metric.metric_name.clone(),
            metric_description: metric.metric_description.clone(),
            metric_unit: metric.metric_unit.clone(),
            metric_type: metric.metric_type.as_str().to_string(),
            value: metric.value,
            service_name: metric.service_name.clone(),
            resource_attributes: metric.resource_attributes.clone(),
            metric_attributes: metric.metric_attributes.clone(),
        }
    }
}

const METRIC_COLUMNS: &str = "Timestamp, MetricName, MetricDescription, MetricUnit, \
     MetricType, Value, ServiceName, ResourceAttributes, MetricAttributes";

/// Insert a batch of metric data points
pub async fn insert_batch(
    client: &Client,
    metrics: &[MetricRecord],
) -> Result<(), ClickhouseError> {
    if metrics.is_empty() {
        return Ok(());
    }

    let mut insert: clickhouse::insert::Insert<MetricRow> = client.insert(METRICS_TABLE).await?;
    for metric in metrics {
        let row = MetricRow::from(metric);
        insert.write(&row).await?;
    }
    insert.end().await?;
    Ok(())
}

/// Fetch metric points inside an inclusive time window, optionally filtered
/// by service, ordered by timestamp ascending and capped at `limit`.
pub async fn fetch_window(
    client: &Client,
    services: &[String],
    start: OffsetDateTime,
    end: OffsetDateTime,
    limit: u64,
) -> Result<Vec<MetricRow>, ClickhouseError> {
    let mut builder = ConditionBuilder::new();
    builder.add_timestamp_gte("Timestamp", start);
    builder.add_timestamp_lte("Timestamp", end);
    builder.add_in("ServiceName", services);

    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY Timestamp ASC LIMIT ?",
        METRIC_COLUMNS,
        METRICS_TABLE,
        builder.build()
    );

    let query = builder.bind_to(client.query(&sql)).bind(limit);
    let rows = query.fetch_all::<MetricRow>().await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::MetricType;
    use crate::utils::time::datetime_from_unix_nanos;

    #[test]
    fn test_metric_row_from_record() {
        let record = MetricRecord {
            timestamp: datetime_from_unix_nanos(1_700_000_000_000_000_000),
            metric_name: "http.server.duration".to_string(),
            metric_description: "request latency".to_string(),
            metric_unit: "ms".to_string(),
            metric_type: MetricType::Histogram,
            value: 128.5,
            service_name: "gateway".to_string(),
            resource_attributes: vec![],
            metric_attributes: vec![("route".to_string(), "/checkout".to_string())],
        };
        let row = MetricRow::from(&record);
        assert_eq!(row.metric_type, "Histogram");
        assert_eq!(row.value, 128.5);
    }
}
