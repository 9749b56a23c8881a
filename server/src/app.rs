//! Core application

use anyhow::{Context, Result};

use crate::core::cli::{self, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::Shutdown;
use crate::data::clickhouse::ClickhouseService;
use crate::data::objectstore::ObjectStore;
use crate::domain::enricher::{EnricherService, load_model};
use crate::domain::loader::LoaderService;

pub struct CoreApp;

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let cli = cli::parse();
        let config = AppConfig::load(&cli)?;

        match cli.command {
            Commands::Loader(_) => Self::run_loader(config).await,
            Commands::Enricher(_) => Self::run_enricher(config).await,
        }
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn run_loader(config: AppConfig) -> Result<()> {
        let warehouse = ClickhouseService::init(&config.clickhouse)
            .await
            .context("Failed to initialize warehouse")?;
        let store = ObjectStore::new(&config.s3).await;

        let shutdown = Shutdown::new();
        shutdown.on_termination_signal();

        let loader = LoaderService::new(&warehouse, store, config.s3.clone(), config.loader.clone());
        for handle in loader.start(shutdown.watcher()) {
            shutdown.track(handle).await;
        }

        shutdown.requested().await;
        shutdown.drain().await;
        Ok(())
    }

    async fn run_enricher(config: AppConfig) -> Result<()> {
        let warehouse = ClickhouseService::init(&config.clickhouse)
            .await
            .context("Failed to initialize warehouse")?;
        let model = load_model(&config.enricher.model_name)
            .context("Configuration error: MODEL_NAME")?;

        let shutdown = Shutdown::new();
        shutdown.on_termination_signal();

        let enricher = EnricherService::new(&warehouse, config.enricher.clone(), model);
        for handle in enricher.start(shutdown.watcher()) {
            shutdown.track(handle).await;
        }

        shutdown.requested().await;
        shutdown.drain().await;
        Ok(())
    }
}
