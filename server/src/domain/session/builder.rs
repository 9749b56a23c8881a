//! Session materialization
//!
//! Query-and-copy strategy: read the warehouse with parameterized window and
//! service predicates, cap each table at the configured row limit ordered by
//! timestamp, and write the rows into the session's private DuckDB database.
//! The manifest is then produced by querying the session database itself, so
//! it always describes exactly what a downstream consumer will see.

use std::collections::BTreeMap;

use async_trait::async_trait;
use clickhouse::Client;

use super::types::{BuildOutput, SessionError, SessionRequest, SignalType};
use crate::core::config::SessionConfig;
use crate::data::clickhouse::ClickhouseService;
use crate::data::clickhouse::repositories::log::{self, LogRow};
use crate::data::clickhouse::repositories::metric::{self, MetricRow};
use crate::data::clickhouse::repositories::span::{self, TraceRow};
use crate::data::objectstore::ObjectStore;
use crate::data::sessiondb::SessionDb;
use crate::utils::time::chrono_to_time;

/// Capability the registry drives builds through. Tests inject a stub.
#[async_trait]
pub trait SessionMaterializer: Send + Sync + 'static {
    /// Materialize a session and return its counts and manifest
    async fn build(
        &self,
        session_id: &str,
        request: &SessionRequest,
    ) -> Result<BuildOutput, SessionError>;

    /// Remove a session's materialization. Idempotent.
    async fn teardown(&self, session_id: &str) -> Result<(), SessionError>;

    /// Service names available for session filters
    async fn list_services(&self) -> Result<Vec<String>, SessionError>;
}

/// Query-and-copy materializer against the warehouse
pub struct SessionBuilder {
    client: Client,
    store: ObjectStore,
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new(warehouse: &ClickhouseService, store: ObjectStore, config: SessionConfig) -> Self {
        Self {
            client: warehouse.client().clone(),
            store,
            config,
        }
    }

    async fn build_session(
        &self,
        session_id: &str,
        request: &SessionRequest,
    ) -> Result<BuildOutput, SessionError> {
        let start = chrono_to_time(request.start_time);
        let end = chrono_to_time(request.end_time);
        let cap = self.config.max_rows_per_table;

        tracing::info!(
            session_id,
            services = request.services.len(),
            signals = ?request.signal_types,
            "Building session"
        );

        let spans: Vec<TraceRow> = if request.signal_types.contains(&SignalType::Traces) {
            span::fetch_window(&self.client, &request.services, start, end, cap).await?
        } else {
            Vec::new()
        };
        let logs: Vec<LogRow> = if request.signal_types.contains(&SignalType::Logs) {
            log::fetch_window(&self.client, &request.services, start, end, cap).await?
        } else {
            Vec::new()
        };
        let metrics: Vec<MetricRow> = if request.signal_types.contains(&SignalType::Metrics) {
            metric::fetch_window(&self.client, &request.services, start, end, cap).await?
        } else {
            Vec::new()
        };

        let session_root = self.config.session_dir.clone();
        let id = session_id.to_string();
        let signal_types = request.signal_types.clone();

        let output = tokio::task::spawn_blocking(move || -> Result<BuildOutput, SessionError> {
            let db = SessionDb::create(&session_root, &id)?;

            let mut counts = BTreeMap::new();
            for signal in &signal_types {
                let written = match signal {
                    SignalType::Traces => db.append_traces(&spans)?,
                    SignalType::Logs => db.append_logs(&logs)?,
                    SignalType::Metrics => db.append_metrics(&metrics)?,
                };
                counts.insert(signal.table_name().to_string(), written);
            }

            let manifest = db.manifest()?;
            db.close()?;
            Ok(BuildOutput { counts, manifest })
        })
        .await
        .map_err(|e| SessionError::BuildFailed(e.to_string()))??;

        tracing::info!(session_id, counts = ?output.counts, "Session built");
        Ok(output)
    }

    async fn drop_session(&self, session_id: &str) -> Result<(), SessionError> {
        let session_root = self.config.session_dir.clone();
        let id = session_id.to_string();

        tokio::task::spawn_blocking(move || SessionDb::remove(&session_root, &id))
            .await
            .map_err(|e| SessionError::BuildFailed(e.to_string()))??;
        Ok(())
    }
}

#[async_trait]
impl SessionMaterializer for SessionBuilder {
    async fn build(
        &self,
        session_id: &str,
        request: &SessionRequest,
    ) -> Result<BuildOutput, SessionError> {
        self.build_session(session_id, request).await
    }

    async fn teardown(&self, session_id: &str) -> Result<(), SessionError> {
        self.drop_session(session_id).await
    }

    /// Distinct services from the warehouse; falls back to the bucket's
    /// service inventory when the warehouse is unreachable.
    async fn list_services(&self) -> Result<Vec<String>, SessionError> {
        match span::list_services(&self.client).await {
            Ok(services) => Ok(services),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Warehouse unreachable for service discovery, reading bucket inventory"
                );
                Ok(self.store.service_inventory().await?)
            }
        }
    }
}
