//! Application-wide constants

/// Application name (lowercase, used in log filters)
pub const APP_NAME_LOWER: &str = "tracelake";

/// Environment variable for log filter configuration
pub const ENV_LOG: &str = "TRACELAKE_LOG";

// =============================================================================
// Object store defaults
// =============================================================================

pub const DEFAULT_S3_ENDPOINT: &str = "http://minio:9000";
pub const DEFAULT_S3_ACCESS_KEY: &str = "minioadmin";
pub const DEFAULT_S3_SECRET_KEY: &str = "minioadmin";
pub const DEFAULT_S3_BUCKET: &str = "traces";
pub const DEFAULT_S3_TRACES_PREFIX: &str = "incoming/";
pub const DEFAULT_S3_LOGS_PREFIX: &str = "logs/";
pub const DEFAULT_S3_METRICS_PREFIX: &str = "metrics/";

/// Region passed to the SDK; S3-compatible stores ignore it but the client
/// requires one.
pub const S3_DEFAULT_REGION: &str = "us-east-1";

/// Side-channel service inventory object (used when the warehouse is not
/// directly queryable)
pub const SERVICE_INVENTORY_KEY: &str = "metadata.json";

// =============================================================================
// Warehouse defaults
// =============================================================================

pub const DEFAULT_CH_HOST: &str = "clickhouse";
pub const DEFAULT_CH_PORT: u16 = 8123;
pub const DEFAULT_CH_USER: &str = "admin";
pub const DEFAULT_CH_PASSWORD: &str = "clickhouse123";
pub const DEFAULT_CH_DATABASE: &str = "otel";

// =============================================================================
// Loader defaults
// =============================================================================

/// Seconds between polls when the previous cycle processed files
pub const DEFAULT_POLL_INTERVAL_BUSY_SECS: f64 = 0.5;

/// Seconds between polls when the previous cycle was idle
pub const DEFAULT_POLL_INTERVAL_IDLE_SECS: f64 = 2.0;

/// Rows per INSERT statement
pub const DEFAULT_LOADER_BATCH_SIZE: usize = 50_000;

/// Concurrent download/parse workers per signal
pub const DEFAULT_MAX_FILE_WORKERS: usize = 16;

// =============================================================================
// Enricher defaults
// =============================================================================

/// Seconds between polls when no new spans are found
pub const DEFAULT_ENRICHER_POLL_INTERVAL_SECS: u64 = 1;

/// Spans fetched per enrichment cycle
pub const DEFAULT_ENRICHER_BATCH_SIZE: u32 = 4096;

/// Built-in deterministic embedding model
pub const DEFAULT_MODEL_NAME: &str = "local-hash-384";

/// Sub-batch size for encoding (memory pacing)
pub const ENRICHER_SUB_BATCH_SIZE: usize = 512;

/// Bounded hand-off between the prefetch and compute stages; the prefetcher
/// sits at most one batch ahead of compute.
pub const ENRICHER_QUEUE_DEPTH: usize = 2;

/// Key under which the single global enricher watermark row lives
pub const ENRICHER_WATERMARK_KEY: &str = "global";

// =============================================================================
// Session defaults
// =============================================================================

pub const DEFAULT_SESSION_DIR: &str = "data/sessions";
pub const DEFAULT_MAX_ROWS_PER_TABLE: u64 = 500_000;

/// Database file inside each session directory
pub const SESSION_DB_FILENAME: &str = "session.duckdb";

/// Sample rows included per table in the session manifest
pub const MANIFEST_SAMPLE_ROWS: usize = 3;

/// Length of generated session ids (hex chars)
pub const SESSION_ID_LEN: usize = 12;

/// Cap on concurrently running session builds
pub const MAX_CONCURRENT_BUILDS: usize = 4;

// =============================================================================
// Shutdown
// =============================================================================

/// Seconds to wait for background tasks during graceful shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
