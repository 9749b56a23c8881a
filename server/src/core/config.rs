use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use super::cli::{Cli, Commands};
use super::constants::{
    DEFAULT_CH_DATABASE, DEFAULT_CH_HOST, DEFAULT_CH_PASSWORD, DEFAULT_CH_PORT, DEFAULT_CH_USER,
    DEFAULT_ENRICHER_BATCH_SIZE, DEFAULT_ENRICHER_POLL_INTERVAL_SECS, DEFAULT_LOADER_BATCH_SIZE,
    DEFAULT_MAX_FILE_WORKERS, DEFAULT_MAX_ROWS_PER_TABLE, DEFAULT_MODEL_NAME,
    DEFAULT_POLL_INTERVAL_BUSY_SECS, DEFAULT_POLL_INTERVAL_IDLE_SECS, DEFAULT_S3_ACCESS_KEY,
    DEFAULT_S3_BUCKET, DEFAULT_S3_ENDPOINT, DEFAULT_S3_LOGS_PREFIX, DEFAULT_S3_METRICS_PREFIX,
    DEFAULT_S3_SECRET_KEY, DEFAULT_S3_TRACES_PREFIX, DEFAULT_SESSION_DIR,
};

/// Object store configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub traces_prefix: String,
    pub logs_prefix: String,
    pub metrics_prefix: String,
}

/// Warehouse connection configuration
#[derive(Debug, Clone)]
pub struct ClickhouseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ClickhouseConfig {
    /// HTTP URL for the clickhouse client
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Loader behavior configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Sleep after a cycle that processed files
    pub poll_busy: Duration,
    /// Sleep after an idle cycle (and after transient poll errors)
    pub poll_idle: Duration,
    /// Rows per INSERT statement
    pub batch_size: usize,
    /// Concurrent download/parse workers per signal
    pub max_file_workers: usize,
}

/// Enricher behavior configuration
#[derive(Debug, Clone)]
pub struct EnricherConfig {
    /// Sleep when no new spans are past the watermark
    pub poll_interval: Duration,
    /// Spans fetched per cycle
    pub batch_size: u32,
    /// Embedding model name (resolved against built-in models)
    pub model_name: String,
}

/// Session engine configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory holding one subdirectory per session
    pub session_dir: PathBuf,
    /// Row cap per table when materializing a session
    pub max_rows_per_table: u64,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub s3: S3Config,
    pub clickhouse: ClickhouseConfig,
    pub loader: LoaderConfig,
    pub enricher: EnricherConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load configuration from CLI arguments (which include env var
    /// fallbacks via clap), applying defaults and validating.
    pub fn load(cli: &Cli) -> Result<Self> {
        let s3 = S3Config {
            endpoint: cli
                .s3_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_S3_ENDPOINT.to_string()),
            access_key: cli
                .s3_access_key
                .clone()
                .unwrap_or_else(|| DEFAULT_S3_ACCESS_KEY.to_string()),
            secret_key: cli
                .s3_secret_key
                .clone()
                .unwrap_or_else(|| DEFAULT_S3_SECRET_KEY.to_string()),
            bucket: cli
                .s3_bucket
                .clone()
                .unwrap_or_else(|| DEFAULT_S3_BUCKET.to_string()),
            traces_prefix: cli
                .s3_traces_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_S3_TRACES_PREFIX.to_string()),
            logs_prefix: cli
                .s3_logs_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_S3_LOGS_PREFIX.to_string()),
            metrics_prefix: cli
                .s3_metrics_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_S3_METRICS_PREFIX.to_string()),
        };

        let clickhouse = ClickhouseConfig {
            host: cli
                .ch_host
                .clone()
                .unwrap_or_else(|| DEFAULT_CH_HOST.to_string()),
            port: cli.ch_port.unwrap_or(DEFAULT_CH_PORT),
            user: cli
                .ch_user
                .clone()
                .unwrap_or_else(|| DEFAULT_CH_USER.to_string()),
            password: cli
                .ch_password
                .clone()
                .unwrap_or_else(|| DEFAULT_CH_PASSWORD.to_string()),
            database: cli
                .ch_database
                .clone()
                .unwrap_or_else(|| DEFAULT_CH_DATABASE.to_string()),
        };

        let session = SessionConfig {
            session_dir: PathBuf::from(
                cli.session_dir
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SESSION_DIR.to_string()),
            ),
            max_rows_per_table: cli.max_rows_per_table.unwrap_or(DEFAULT_MAX_ROWS_PER_TABLE),
        };

        // Component sections take their values from the active subcommand;
        // the other section keeps its defaults.
        let mut loader = LoaderConfig {
            poll_busy: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_BUSY_SECS),
            poll_idle: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_IDLE_SECS),
            batch_size: DEFAULT_LOADER_BATCH_SIZE,
            max_file_workers: DEFAULT_MAX_FILE_WORKERS,
        };
        let mut enricher = EnricherConfig {
            poll_interval: Duration::from_secs(DEFAULT_ENRICHER_POLL_INTERVAL_SECS),
            batch_size: DEFAULT_ENRICHER_BATCH_SIZE,
            model_name: DEFAULT_MODEL_NAME.to_string(),
        };

        match &cli.command {
            Commands::Loader(args) => {
                if let Some(busy) = args.poll_interval_busy {
                    if !busy.is_finite() || busy <= 0.0 {
                        anyhow::bail!(
                            "Configuration error: POLL_INTERVAL_BUSY must be greater than 0"
                        );
                    }
                    loader.poll_busy = Duration::from_secs_f64(busy);
                }
                if let Some(idle) = args.poll_interval_idle {
                    if !idle.is_finite() || idle <= 0.0 {
                        anyhow::bail!(
                            "Configuration error: POLL_INTERVAL_IDLE must be greater than 0"
                        );
                    }
                    loader.poll_idle = Duration::from_secs_f64(idle);
                }
                if let Some(batch) = args.batch_size {
                    loader.batch_size = batch;
                }
                if let Some(workers) = args.max_file_workers {
                    loader.max_file_workers = workers;
                }
            }
            Commands::Enricher(args) => {
                if let Some(poll) = args.poll_interval {
                    enricher.poll_interval = Duration::from_secs(poll);
                }
                if let Some(batch) = args.batch_size {
                    enricher.batch_size = batch;
                }
                if let Some(ref model) = args.model_name {
                    enricher.model_name = model.clone();
                }
            }
        }

        let config = Self {
            s3,
            clickhouse,
            loader,
            enricher,
            session,
        };
        config.validate()?;

        tracing::debug!(
            s3_endpoint = %config.s3.endpoint,
            s3_bucket = %config.s3.bucket,
            ch_host = %config.clickhouse.host,
            ch_port = config.clickhouse.port,
            ch_database = %config.clickhouse.database,
            session_dir = %config.session.session_dir.display(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.s3.endpoint.is_empty() {
            anyhow::bail!("Configuration error: S3_ENDPOINT must not be empty");
        }
        if self.s3.bucket.is_empty() {
            anyhow::bail!("Configuration error: S3_BUCKET must not be empty");
        }
        if self.clickhouse.host.is_empty() {
            anyhow::bail!("Configuration error: CH_HOST must not be empty");
        }
        if self.clickhouse.port == 0 {
            anyhow::bail!("Configuration error: CH_PORT must be greater than 0");
        }
        if self.loader.batch_size == 0 {
            anyhow::bail!("Configuration error: BATCH_SIZE must be greater than 0");
        }
        if self.loader.max_file_workers == 0 {
            anyhow::bail!("Configuration error: MAX_FILE_WORKERS must be greater than 0");
        }
        if self.loader.poll_busy.is_zero() || self.loader.poll_idle.is_zero() {
            anyhow::bail!("Configuration error: poll intervals must be greater than 0");
        }
        if self.enricher.batch_size == 0 {
            anyhow::bail!("Configuration error: enricher BATCH_SIZE must be greater than 0");
        }
        if self.enricher.model_name.is_empty() {
            anyhow::bail!("Configuration error: MODEL_NAME must not be empty");
        }
        if self.session.max_rows_per_table == 0 {
            anyhow::bail!("Configuration error: MAX_ROWS_PER_TABLE must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cli::{Commands, LoaderArgs};
    use clap::Parser;

    fn loader_cli(extra: &[&str]) -> Cli {
        let mut argv = vec!["tracelake"];
        argv.extend_from_slice(extra);
        argv.push("loader");
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let cli = loader_cli(&[]);
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.s3.bucket, "traces");
        assert_eq!(config.s3.traces_prefix, "incoming/");
        assert_eq!(config.clickhouse.port, 8123);
        assert_eq!(config.loader.batch_size, 50_000);
        assert_eq!(config.loader.max_file_workers, 16);
        assert_eq!(config.session.max_rows_per_table, 500_000);
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = loader_cli(&["--s3-bucket", "telemetry", "--ch-port", "9001"]);
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.s3.bucket, "telemetry");
        assert_eq!(config.clickhouse.port, 9001);
        assert_eq!(config.clickhouse.url(), "http://clickhouse:9001");
    }

    #[test]
    fn test_loader_args_override_section() {
        let cli = Cli::try_parse_from([
            "tracelake",
            "loader",
            "--batch-size",
            "100",
            "--max-file-workers",
            "4",
        ])
        .unwrap();
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.loader.batch_size, 100);
        assert_eq!(config.loader.max_file_workers, 4);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let cli = Cli {
            command: Commands::Loader(LoaderArgs {
                poll_interval_busy: None,
                poll_interval_idle: None,
                batch_size: Some(0),
                max_file_workers: None,
            }),
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_bucket: None,
            s3_traces_prefix: None,
            s3_logs_prefix: None,
            s3_metrics_prefix: None,
            ch_host: None,
            ch_port: None,
            ch_user: None,
            ch_password: None,
            ch_database: None,
            session_dir: None,
            max_rows_per_table: None,
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("BATCH_SIZE"));
    }
}
