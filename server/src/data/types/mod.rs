//! Shared record types for the data plane
//!
//! Closed counterparts of the loosely-typed rows the pipelines move around:
//! decoded telemetry records, the enriched span, and watermark state.

use time::OffsetDateTime;

/// Ordered string attribute map.
///
/// Insertion order is preserved from the wire payload; the embedding text
/// construction depends on it.
pub type AttrMap = Vec<(String, String)>;

/// Telemetry signal kinds handled by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Traces,
    Logs,
    Metrics,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Logs => "logs",
            Signal::Metrics => "metrics",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Span kind, stored by its short canonical name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    /// Map the protobuf enum value; unknown values become `Unspecified`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => SpanKind::Internal,
            2 => SpanKind::Server,
            3 => SpanKind::Client,
            4 => SpanKind::Producer,
            5 => SpanKind::Consumer,
            _ => SpanKind::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Unspecified => "UNSPECIFIED",
            SpanKind::Internal => "INTERNAL",
            SpanKind::Server => "SERVER",
            SpanKind::Client => "CLIENT",
            SpanKind::Producer => "PRODUCER",
            SpanKind::Consumer => "CONSUMER",
        }
    }
}

/// Span status code, stored by its short canonical name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

impl StatusCode {
    /// Map the protobuf enum value; unknown values become `Unset`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => StatusCode::Ok,
            2 => StatusCode::Error,
            _ => StatusCode::Unset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Unset => "UNSET",
            StatusCode::Ok => "OK",
            StatusCode::Error => "ERROR",
        }
    }
}

/// Metric point kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
    Sum,
    Histogram,
    ExponentialHistogram,
    Summary,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "Gauge",
            MetricType::Sum => "Sum",
            MetricType::Histogram => "Histogram",
            MetricType::ExponentialHistogram => "ExponentialHistogram",
            MetricType::Summary => "Summary",
        }
    }
}

/// A span event, order-preserved from the payload
#[derive(Debug, Clone, PartialEq)]
pub struct SpanEvent {
    pub timestamp: OffsetDateTime,
    pub name: String,
    pub attributes: AttrMap,
}

/// A span link, order-preserved from the payload
#[derive(Debug, Clone, PartialEq)]
pub struct SpanLink {
    pub trace_id: String,
    pub span_id: String,
    pub trace_state: String,
    pub attributes: AttrMap,
}

/// One decoded span. Identity is `(timestamp, span_id)`; rows are immutable
/// once written to the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub timestamp: OffsetDateTime,
    pub trace_id: String,
    pub span_id: String,
    /// Empty string marks a root span
    pub parent_span_id: String,
    pub trace_state: String,
    pub span_name: String,
    pub span_kind: SpanKind,
    pub service_name: String,
    pub resource_attributes: AttrMap,
    pub scope_name: String,
    pub scope_version: String,
    pub span_attributes: AttrMap,
    /// end - start, clamped to zero
    pub duration_ns: u64,
    pub status_code: StatusCode,
    pub status_message: String,
    pub events: Vec<SpanEvent>,
    pub links: Vec<SpanLink>,
}

/// One decoded log record
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: OffsetDateTime,
    /// Empty when the record is not correlated to a trace
    pub trace_id: String,
    pub span_id: String,
    pub severity_number: u8,
    pub severity_text: String,
    pub body: String,
    pub service_name: String,
    pub resource_attributes: AttrMap,
    pub log_attributes: AttrMap,
}

/// One decoded metric data point, flattened to a scalar value
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub timestamp: OffsetDateTime,
    pub metric_name: String,
    pub metric_description: String,
    pub metric_unit: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub service_name: String,
    pub resource_attributes: AttrMap,
    pub metric_attributes: AttrMap,
}

/// A span mirrored into the enriched table together with its derived text
/// and embedding vector. Kind and status carry the stored string forms.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedSpan {
    pub timestamp: OffsetDateTime,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub span_name: String,
    pub span_kind: String,
    pub service_name: String,
    pub duration_ns: u64,
    pub status_code: String,
    pub status_message: String,
    pub resource_attributes: AttrMap,
    pub span_attributes: AttrMap,
    pub embedding_text: String,
    pub embedding: Vec<f32>,
}

/// One column of a materialized session table
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Manifest entry for one session table: schema plus a small sample
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableManifest {
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
    /// Up to 3 rows rendered as column -> string
    pub sample_rows: Vec<std::collections::BTreeMap<String, String>>,
}

/// Session manifest: table name -> schema + sample. Only non-empty tables
/// appear.
pub type SessionManifest = std::collections::BTreeMap<String, TableManifest>;

/// File processing outcome recorded in the watermark tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Done,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Done => "done",
            FileStatus::Failed => "failed",
        }
    }
}

/// The single global enricher watermark: the lexicographic upper bound of
/// spans already mirrored into the enriched table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnricherWatermark {
    pub last_timestamp: OffsetDateTime,
    pub last_span_id: String,
}

impl EnricherWatermark {
    /// Initial watermark: nothing enriched yet
    pub fn origin() -> Self {
        Self {
            last_timestamp: OffsetDateTime::UNIX_EPOCH,
            last_span_id: String::new(),
        }
    }

    /// Lexicographic `(timestamp, span_id)` key for ordering checks
    pub fn key(&self) -> (OffsetDateTime, &str) {
        (self.last_timestamp, self.last_span_id.as_str())
    }
}
