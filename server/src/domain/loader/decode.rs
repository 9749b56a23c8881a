//! OTLP envelope decoding
//!
//! Each object-store file holds exactly one `Export*Request` rendered as
//! OTLP JSON. Decoding flattens the envelope into the warehouse record
//! types, one row per span, log record, or metric data point.

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value;
use opentelemetry_proto::tonic::metrics::v1::{Metric, metric, number_data_point};

use crate::data::types::{
    AttrMap, LogRecord, MetricRecord, MetricType, SpanEvent, SpanKind, SpanLink, SpanRecord,
    StatusCode,
};
use crate::utils::otlp::{any_value_to_string, extract_attributes};
use crate::utils::time::datetime_from_unix_nanos;

const UNKNOWN_SERVICE: &str = "unknown";

/// Resolve the service name from resource attributes
fn service_name(resource_attrs: &AttrMap) -> String {
    resource_attrs
        .iter()
        .find(|(k, _)| k == "service.name")
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| UNKNOWN_SERVICE.to_string())
}

/// Canonical severity text for a severity number; 0 and out-of-range values
/// are `UNSPECIFIED`.
pub fn severity_text_for(severity_number: i32) -> &'static str {
    match severity_number {
        1 => "TRACE",
        2 => "TRACE2",
        3 => "TRACE3",
        4 => "TRACE4",
        5 => "DEBUG",
        6 => "DEBUG2",
        7 => "DEBUG3",
        8 => "DEBUG4",
        9 => "INFO",
        10 => "INFO2",
        11 => "INFO3",
        12 => "INFO4",
        13 => "WARN",
        14 => "WARN2",
        15 => "WARN3",
        16 => "WARN4",
        17 => "ERROR",
        18 => "ERROR2",
        19 => "ERROR3",
        20 => "ERROR4",
        21 => "FATAL",
        22 => "FATAL2",
        23 => "FATAL3",
        24 => "FATAL4",
        _ => "UNSPECIFIED",
    }
}

// ============================================================================
// TRACES
// ============================================================================

/// Parse an OTLP JSON trace envelope into flat span records
pub fn decode_traces(raw: &str) -> Result<Vec<SpanRecord>, serde_json::Error> {
    let request: ExportTraceServiceRequest = serde_json::from_str(raw)?;

    let mut rows = Vec::new();
    for resource_spans in &request.resource_spans {
        let resource_attrs = resource_spans
            .resource
            .as_ref()
            .map(|r| extract_attributes(&r.attributes))
            .unwrap_or_default();
        let service = service_name(&resource_attrs);

        for scope_spans in &resource_spans.scope_spans {
            let (scope_name, scope_version) = scope_spans
                .scope
                .as_ref()
                .map(|s| (s.name.clone(), s.version.clone()))
                .unwrap_or_default();

            for span in &scope_spans.spans {
                let events = span
                    .events
                    .iter()
                    .map(|event| SpanEvent {
                        timestamp: datetime_from_unix_nanos(event.time_unix_nano),
                        name: event.name.clone(),
                        attributes: extract_attributes(&event.attributes),
                    })
                    .collect();

                let links = span
                    .links
                    .iter()
                    .map(|link| SpanLink {
                        trace_id: hex::encode(&link.trace_id),
                        span_id: hex::encode(&link.span_id),
                        trace_state: link.trace_state.clone(),
                        attributes: extract_attributes(&link.attributes),
                    })
                    .collect();

                let (status_code, status_message) = span
                    .status
                    .as_ref()
                    .map(|s| (StatusCode::from_i32(s.code), s.message.clone()))
                    .unwrap_or_default();

                rows.push(SpanRecord {
                    timestamp: datetime_from_unix_nanos(span.start_time_unix_nano),
                    trace_id: hex::encode(&span.trace_id),
                    span_id: hex::encode(&span.span_id),
                    parent_span_id: hex::encode(&span.parent_span_id),
                    trace_state: span.trace_state.clone(),
                    span_name: span.name.clone(),
                    span_kind: SpanKind::from_i32(span.kind),
                    service_name: service.clone(),
                    resource_attributes: resource_attrs.clone(),
                    scope_name: scope_name.clone(),
                    scope_version: scope_version.clone(),
                    span_attributes: extract_attributes(&span.attributes),
                    duration_ns: span.end_time_unix_nano.saturating_sub(span.start_time_unix_nano),
                    status_code,
                    status_message,
                    events,
                    links,
                });
            }
        }
    }

    Ok(rows)
}

// ============================================================================
// LOGS
// ============================================================================

/// Parse an OTLP JSON log envelope into flat log records
pub fn decode_logs(raw: &str) -> Result<Vec<LogRecord>, serde_json::Error> {
    let request: ExportLogsServiceRequest = serde_json::from_str(raw)?;

    let mut rows = Vec::new();
    for resource_logs in &request.resource_logs {
        let resource_attrs = resource_logs
            .resource
            .as_ref()
            .map(|r| extract_attributes(&r.attributes))
            .unwrap_or_default();
        let service = service_name(&resource_attrs);

        for scope_logs in &resource_logs.scope_logs {
            for log in &scope_logs.log_records {
                let severity_number = log.severity_number.clamp(0, u8::MAX as i32) as u8;
                let severity_text = if log.severity_text.is_empty() {
                    severity_text_for(log.severity_number).to_string()
                } else {
                    log.severity_text.clone()
                };

                let body = match &log.body {
                    Some(body) => match &body.value {
                        Some(any_value::Value::StringValue(s)) => s.clone(),
                        _ => any_value_to_string(body),
                    },
                    None => String::new(),
                };

                rows.push(LogRecord {
                    timestamp: datetime_from_unix_nanos(log.time_unix_nano),
                    trace_id: hex::encode(&log.trace_id),
                    span_id: hex::encode(&log.span_id),
                    severity_number,
                    severity_text,
                    body,
                    service_name: service.clone(),
                    resource_attributes: resource_attrs.clone(),
                    log_attributes: extract_attributes(&log.attributes),
                });
            }
        }
    }

    Ok(rows)
}

// ============================================================================
// METRICS
// ============================================================================

/// Extract `(timestamp_ns, value, attributes)` triples from a metric.
///
/// Gauge and sum points take `as_double` when present, else `as_int`
/// promoted; histogram and summary points flatten to their `sum`.
/// Exponential histograms yield no points.
fn extract_data_points(metric: &Metric) -> Vec<(u64, f64, AttrMap)> {
    let mut points = Vec::new();

    match &metric.data {
        Some(metric::Data::Gauge(gauge)) => {
            for dp in &gauge.data_points {
                points.push((
                    dp.time_unix_nano,
                    number_value(&dp.value),
                    extract_attributes(&dp.attributes),
                ));
            }
        }
        Some(metric::Data::Sum(sum)) => {
            for dp in &sum.data_points {
                points.push((
                    dp.time_unix_nano,
                    number_value(&dp.value),
                    extract_attributes(&dp.attributes),
                ));
            }
        }
        Some(metric::Data::Histogram(histogram)) => {
            for dp in &histogram.data_points {
                points.push((
                    dp.time_unix_nano,
                    dp.sum.unwrap_or(0.0),
                    extract_attributes(&dp.attributes),
                ));
            }
        }
        Some(metric::Data::Summary(summary)) => {
            for dp in &summary.data_points {
                points.push((dp.time_unix_nano, dp.sum, extract_attributes(&dp.attributes)));
            }
        }
        Some(metric::Data::ExponentialHistogram(_)) | None => {}
    }

    points
}

fn number_value(value: &Option<number_data_point::Value>) -> f64 {
    match value {
        Some(number_data_point::Value::AsDouble(d)) => *d,
        Some(number_data_point::Value::AsInt(i)) => *i as f64,
        None => 0.0,
    }
}

fn metric_type(metric: &Metric) -> Option<MetricType> {
    match &metric.data {
        Some(metric::Data::Gauge(_)) => Some(MetricType::Gauge),
        Some(metric::Data::Sum(_)) => Some(MetricType::Sum),
        Some(metric::Data::Histogram(_)) => Some(MetricType::Histogram),
        Some(metric::Data::ExponentialHistogram(_)) => Some(MetricType::ExponentialHistogram),
        Some(metric::Data::Summary(_)) => Some(MetricType::Summary),
        None => None,
    }
}

/// Parse an OTLP JSON metric envelope into flat data point records
pub fn decode_metrics(raw: &str) -> Result<Vec<MetricRecord>, serde_json::Error> {
    let request: ExportMetricsServiceRequest = serde_json::from_str(raw)?;

    let mut rows = Vec::new();
    for resource_metrics in &request.resource_metrics {
        let resource_attrs = resource_metrics
            .resource
            .as_ref()
            .map(|r| extract_attributes(&r.attributes))
            .unwrap_or_default();
        let service = service_name(&resource_attrs);

        for scope_metrics in &resource_metrics.scope_metrics {
            for metric in &scope_metrics.metrics {
                let Some(metric_type) = metric_type(metric) else {
                    continue;
                };

                for (ts_nanos, value, dp_attrs) in extract_data_points(metric) {
                    rows.push(MetricRecord {
                        timestamp: datetime_from_unix_nanos(ts_nanos),
                        metric_name: metric.name.clone(),
                        metric_description: metric.description.clone(),
                        metric_unit: metric.unit.clone(),
                        metric_type,
                        value,
                        service_name: service.clone(),
                        resource_attributes: resource_attrs.clone(),
                        metric_attributes: dp_attrs,
                    });
                }
            }
        }
    }

    Ok(rows)
}
