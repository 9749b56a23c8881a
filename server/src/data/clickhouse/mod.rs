//! ClickHouse warehouse service
//!
//! Owns client construction and schema management. Each pipeline clones the
//! client; clones share the underlying HTTP connection pool.

pub mod error;
pub mod repositories;
pub mod schema;

pub use error::ClickhouseError;

use clickhouse::Client;

use crate::core::config::ClickhouseConfig;

/// ClickHouse warehouse service
///
/// Handles database initialization and provides access to the client.
/// The clickhouse crate's Client internally uses hyper with connection
/// pooling via HTTP keep-alive.
pub struct ClickhouseService {
    client: Client,
}

impl ClickhouseService {
    /// Initialize the warehouse connection and ensure the schema exists
    pub async fn init(config: &ClickhouseConfig) -> Result<Self, ClickhouseError> {
        let client = Client::default()
            .with_url(config.url())
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(&config.password)
            .with_compression(clickhouse::Compression::Lz4);

        let service = Self { client };
        service.run_migrations().await?;

        tracing::debug!(
            url = %config.url(),
            database = %config.database,
            "ClickhouseService initialized"
        );

        Ok(service)
    }

    /// Get the ClickHouse client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Health check - verify connection to ClickHouse
    pub async fn health_check(&self) -> Result<(), ClickhouseError> {
        self.client
            .query("SELECT 1")
            .execute()
            .await
            .map_err(ClickhouseError::from)
    }

    /// Run schema migrations
    async fn run_migrations(&self) -> Result<(), ClickhouseError> {
        let table_exists: bool = self
            .client
            .query(
                "SELECT count() > 0 FROM system.tables WHERE database = currentDatabase() AND name = 'schema_version'",
            )
            .fetch_one()
            .await
            .map_err(|e| ClickhouseError::Connection(format!(
                "Failed to check schema_version table: {}. Verify ClickHouse is running and accessible.",
                e
            )))?;

        if !table_exists {
            tracing::debug!("Applying initial schema v{}", schema::SCHEMA_VERSION);
            self.apply_initial_schema().await?;
            return Ok(());
        }

        let current_version: Option<i32> = self
            .client
            .query("SELECT version FROM schema_version FINAL WHERE id = 1")
            .fetch_optional()
            .await
            .ok()
            .flatten();

        match current_version {
            None => {
                tracing::debug!("Applying initial schema v{}", schema::SCHEMA_VERSION);
                self.apply_initial_schema().await?;
            }
            Some(v) if v < schema::SCHEMA_VERSION => {
                return Err(ClickhouseError::MigrationFailed {
                    version: v + 1,
                    name: "unknown".to_string(),
                    error: format!("No migration defined for version {}", v + 1),
                });
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(ClickhouseError::MigrationFailed {
                    version: v,
                    name: "version_check".to_string(),
                    error: format!(
                        "Database schema version {} is newer than application version {}. Upgrade the application.",
                        v,
                        schema::SCHEMA_VERSION
                    ),
                });
            }
            _ => {
                tracing::debug!("Schema is up to date (v{})", schema::SCHEMA_VERSION);
            }
        }

        Ok(())
    }

    /// Apply initial schema
    async fn apply_initial_schema(&self) -> Result<(), ClickhouseError> {
        let statements = schema::generate_schema();

        for table_sql in &statements {
            self.client
                .query(table_sql)
                .execute()
                .await
                .map_err(ClickhouseError::from)?;
        }

        let now = chrono::Utc::now().timestamp();
        self.client
            .query(
                "INSERT INTO schema_version (id, version, applied_at, description) VALUES (?, ?, ?, ?)",
            )
            .bind(1u8)
            .bind(schema::SCHEMA_VERSION)
            .bind(now)
            .bind("Initial schema")
            .execute()
            .await
            .map_err(ClickhouseError::from)?;

        tracing::debug!(
            version = schema::SCHEMA_VERSION,
            "Schema applied successfully"
        );
        Ok(())
    }
}
