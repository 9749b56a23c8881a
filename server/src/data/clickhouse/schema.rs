//! ClickHouse schema definitions
//!
//! One table per signal, the enriched span mirror, and the watermark tables.
//! Watermark tables use ReplacingMergeTree so the latest row per key wins;
//! readers query them with FINAL.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Signal tables written by the loader
pub const TRACES_TABLE: &str = "otel_traces";
pub const LOGS_TABLE: &str = "otel_logs";
pub const METRICS_TABLE: &str = "otel_metrics";

/// Enriched span mirror written by the enricher
pub const TRACES_ENRICHED_TABLE: &str = "otel_traces_enriched";

/// File watermark tables, one per signal
pub const TRACES_WATERMARK_TABLE: &str = "loader_file_watermark";
pub const LOGS_WATERMARK_TABLE: &str = "log_loader_file_watermark";
pub const METRICS_WATERMARK_TABLE: &str = "metric_loader_file_watermark";

/// Single-row enricher watermark table
pub const ENRICHER_WATERMARK_TABLE: &str = "enricher_watermark";

const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id UInt8,
    version Int32,
    applied_at Int64,
    description Nullable(String)
) ENGINE = ReplacingMergeTree()
ORDER BY id
"#;

const OTEL_TRACES: &str = r#"
CREATE TABLE IF NOT EXISTS otel_traces (
    Timestamp          DateTime64(9, 'UTC')                    CODEC(Delta, ZSTD(1)),
    TraceId            String                                  CODEC(ZSTD(1)),
    SpanId             String                                  CODEC(ZSTD(1)),
    ParentSpanId       String                                  CODEC(ZSTD(1)),
    TraceState         String                                  CODEC(ZSTD(1)),
    SpanName           LowCardinality(String)                  CODEC(ZSTD(1)),
    SpanKind           LowCardinality(String)                  CODEC(ZSTD(1)),
    ServiceName        LowCardinality(String)                  CODEC(ZSTD(1)),
    ResourceAttributes Map(LowCardinality(String), String)     CODEC(ZSTD(1)),
    ScopeName          String                                  CODEC(ZSTD(1)),
    ScopeVersion       String                                  CODEC(ZSTD(1)),
    SpanAttributes     Map(LowCardinality(String), String)     CODEC(ZSTD(1)),
    Duration           UInt64                                  CODEC(ZSTD(1)),
    StatusCode         LowCardinality(String)                  CODEC(ZSTD(1)),
    StatusMessage      String                                  CODEC(ZSTD(1)),
    EventTimestamps    Array(DateTime64(9, 'UTC'))             CODEC(ZSTD(1)),
    EventNames         Array(LowCardinality(String))           CODEC(ZSTD(1)),
    EventAttributes    Array(Map(LowCardinality(String), String)) CODEC(ZSTD(1)),
    LinkTraceIds       Array(String)                           CODEC(ZSTD(1)),
    LinkSpanIds        Array(String)                           CODEC(ZSTD(1)),
    LinkTraceStates    Array(String)                           CODEC(ZSTD(1)),
    LinkAttributes     Array(Map(LowCardinality(String), String)) CODEC(ZSTD(1)),

    INDEX idx_trace_id TraceId TYPE bloom_filter GRANULARITY 1,
    INDEX idx_span_id SpanId TYPE bloom_filter GRANULARITY 1
) ENGINE = MergeTree()
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, SpanName, toDateTime(Timestamp))
SETTINGS index_granularity = 8192
"#;

const OTEL_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS otel_logs (
    Timestamp          DateTime64(9, 'UTC')                    CODEC(Delta, ZSTD(1)),
    TraceId            String                                  CODEC(ZSTD(1)),
    SpanId             String                                  CODEC(ZSTD(1)),
    SeverityNumber     UInt8                                   CODEC(ZSTD(1)),
    SeverityText       LowCardinality(String)                  CODEC(ZSTD(1)),
    Body               String                                  CODEC(ZSTD(1)),
    ServiceName        LowCardinality(String)                  CODEC(ZSTD(1)),
    ResourceAttributes Map(LowCardinality(String), String)     CODEC(ZSTD(1)),
    LogAttributes      Map(LowCardinality(String), String)     CODEC(ZSTD(1))
) ENGINE = MergeTree()
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, SeverityText, toDateTime(Timestamp))
SETTINGS index_granularity = 8192
"#;

const OTEL_METRICS: &str = r#"
CREATE TABLE IF NOT EXISTS otel_metrics (
    Timestamp          DateTime64(9, 'UTC')                    CODEC(Delta, ZSTD(1)),
    MetricName         LowCardinality(String)                  CODEC(ZSTD(1)),
    MetricDescription  String                                  CODEC(ZSTD(1)),
    MetricUnit         String                                  CODEC(ZSTD(1)),
    MetricType         LowCardinality(String)                  CODEC(ZSTD(1)),
    Value              Float64                                 CODEC(ZSTD(1)),
    ServiceName        LowCardinality(String)                  CODEC(ZSTD(1)),
    ResourceAttributes Map(LowCardinality(String), String)     CODEC(ZSTD(1)),
    MetricAttributes   Map(LowCardinality(String), String)     CODEC(ZSTD(1))
) ENGINE = MergeTree()
PARTITION BY toDate(Timestamp)
ORDER BY (ServiceName, MetricName, toDateTime(Timestamp))
SETTINGS index_granularity = 8192
"#;

const OTEL_TRACES_ENRICHED: &str = r#"
CREATE TABLE IF NOT EXISTS otel_traces_enriched (
    Timestamp          DateTime64(9, 'UTC')                    CODEC(Delta, ZSTD(1)),
    TraceId            String                                  CODEC(ZSTD(1)),
    SpanId             String                                  CODEC(ZSTD(1)),
    ParentSpanId       String                                  CODEC(ZSTD(1)),
    SpanName           LowCardinality(String)                  CODEC(ZSTD(1)),
    SpanKind           LowCardinality(String)                  CODEC(ZSTD(1)),
    ServiceName        LowCardinality(String)                  CODEC(ZSTD(1)),
    Duration           UInt64                                  CODEC(ZSTD(1)),
    StatusCode         LowCardinality(String)                  CODEC(ZSTD(1)),
    StatusMessage      String                                  CODEC(ZSTD(1)),
    ResourceAttributes Map(LowCardinality(String), String)     CODEC(ZSTD(1)),
    SpanAttributes     Map(LowCardinality(String), String)     CODEC(ZSTD(1)),
    EmbeddingText      String                                  CODEC(ZSTD(1)),
    Embedding          Array(Float32)                          CODEC(ZSTD(1))
) ENGINE = MergeTree()
PARTITION BY toDate(Timestamp)
ORDER BY (Timestamp, SpanId)
SETTINGS index_granularity = 8192
"#;

const ENRICHER_WATERMARK: &str = r#"
CREATE TABLE IF NOT EXISTS enricher_watermark (
    WatermarkKey       LowCardinality(String),
    LastTimestamp      DateTime64(9, 'UTC'),
    LastSpanId         String,
    UpdatedAt          DateTime64(6, 'UTC')
) ENGINE = ReplacingMergeTree(UpdatedAt)
ORDER BY WatermarkKey
"#;

/// File watermark DDL, shared by the three per-signal tables
fn file_watermark_table(name: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {name} (
    Filename           String,
    Status             LowCardinality(String),
    ProcessedAt        DateTime64(6, 'UTC'),
    RowCount           UInt64,
    ErrorMessage       String
) ENGINE = ReplacingMergeTree(ProcessedAt)
ORDER BY Filename
"#
    )
}

/// All CREATE TABLE statements for the current schema version
pub fn generate_schema() -> Vec<String> {
    vec![
        SCHEMA_VERSION_TABLE.to_string(),
        OTEL_TRACES.to_string(),
        OTEL_LOGS.to_string(),
        OTEL_METRICS.to_string(),
        OTEL_TRACES_ENRICHED.to_string(),
        file_watermark_table(TRACES_WATERMARK_TABLE),
        file_watermark_table(LOGS_WATERMARK_TABLE),
        file_watermark_table(METRICS_WATERMARK_TABLE),
        ENRICHER_WATERMARK.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_contains_all_tables() {
        let statements = generate_schema();
        let all = statements.join("\n");
        for table in [
            TRACES_TABLE,
            LOGS_TABLE,
            METRICS_TABLE,
            TRACES_ENRICHED_TABLE,
            TRACES_WATERMARK_TABLE,
            LOGS_WATERMARK_TABLE,
            METRICS_WATERMARK_TABLE,
            ENRICHER_WATERMARK_TABLE,
        ] {
            assert!(
                all.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "missing DDL for {}",
                table
            );
        }
    }

    #[test]
    fn test_watermark_tables_are_latest_wins() {
        let ddl = file_watermark_table(TRACES_WATERMARK_TABLE);
        assert!(ddl.contains("ReplacingMergeTree(ProcessedAt)"));
        assert!(ddl.contains("ORDER BY Filename"));
    }
}
