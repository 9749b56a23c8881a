use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tracelake")]
#[command(version, about = "Telemetry data plane", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // Object store connection
    /// S3-compatible endpoint URL
    #[arg(long, global = true, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// S3 access key
    #[arg(long, global = true, env = "S3_ACCESS_KEY")]
    pub s3_access_key: Option<String>,

    /// S3 secret key
    #[arg(long, global = true, env = "S3_SECRET_KEY")]
    pub s3_secret_key: Option<String>,

    /// Bucket holding telemetry files
    #[arg(long, global = true, env = "S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix for trace files
    #[arg(long, global = true, env = "S3_TRACES_PREFIX")]
    pub s3_traces_prefix: Option<String>,

    /// Key prefix for log files
    #[arg(long, global = true, env = "S3_LOGS_PREFIX")]
    pub s3_logs_prefix: Option<String>,

    /// Key prefix for metric files
    #[arg(long, global = true, env = "S3_METRICS_PREFIX")]
    pub s3_metrics_prefix: Option<String>,

    // Warehouse connection
    /// ClickHouse host
    #[arg(long, global = true, env = "CH_HOST")]
    pub ch_host: Option<String>,

    /// ClickHouse HTTP port
    #[arg(long, global = true, env = "CH_PORT")]
    pub ch_port: Option<u16>,

    /// ClickHouse user
    #[arg(long, global = true, env = "CH_USER")]
    pub ch_user: Option<String>,

    /// ClickHouse password
    #[arg(long, global = true, env = "CH_PASSWORD")]
    pub ch_password: Option<String>,

    /// ClickHouse database
    #[arg(long, global = true, env = "CH_DATABASE")]
    pub ch_database: Option<String>,

    // Session engine
    /// Directory holding per-session databases
    #[arg(long, global = true, env = "SESSION_DIR")]
    pub session_dir: Option<String>,

    /// Row cap per table when materializing a session
    #[arg(long, global = true, env = "MAX_ROWS_PER_TABLE")]
    pub max_rows_per_table: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the object-store loader (traces, logs, metrics)
    Loader(LoaderArgs),
    /// Run the embedding enricher
    Enricher(EnricherArgs),
}

#[derive(Args, Debug)]
pub struct LoaderArgs {
    /// Seconds between polls after a cycle that processed files
    #[arg(long, env = "POLL_INTERVAL_BUSY")]
    pub poll_interval_busy: Option<f64>,

    /// Seconds between polls after an idle cycle
    #[arg(long, env = "POLL_INTERVAL_IDLE")]
    pub poll_interval_idle: Option<f64>,

    /// Rows per INSERT statement
    #[arg(long, env = "BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Concurrent download/parse workers per signal
    #[arg(long, env = "MAX_FILE_WORKERS")]
    pub max_file_workers: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EnricherArgs {
    /// Seconds between polls when no new spans are found
    #[arg(long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Spans fetched per enrichment cycle
    #[arg(long, env = "BATCH_SIZE")]
    pub batch_size: Option<u32>,

    /// Embedding model name
    #[arg(long, env = "MODEL_NAME")]
    pub model_name: Option<String>,
}

/// Parse command-line arguments (includes env var fallbacks via clap)
pub fn parse() -> Cli {
    Cli::parse()
}
