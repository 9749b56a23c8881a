//! Per-session DuckDB store
//!
//! Each session owns `<SESSION_DIR>/<id>/session.duckdb` with read-only
//! copies of the warehouse rows that matched its filters. Attribute maps and
//! event/link collections are serialized as JSON text. All operations here
//! are blocking; callers run them on a blocking thread.

pub mod error;

pub use error::SessionDbError;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use duckdb::{Connection, params};

use crate::core::constants::{MANIFEST_SAMPLE_ROWS, SESSION_DB_FILENAME};
use crate::data::clickhouse::repositories::log::LogRow;
use crate::data::clickhouse::repositories::metric::MetricRow;
use crate::data::clickhouse::repositories::span::TraceRow;
use crate::data::types::{AttrMap, ColumnInfo, SessionManifest, TableManifest};
use crate::utils::time::{datetime_from_unix_nanos, format_sql_timestamp};

/// Tables inside a session database, in manifest order
pub const SESSION_TABLES: [&str; 3] = ["traces", "logs", "metrics"];

const CREATE_TRACES: &str = r#"
CREATE TABLE IF NOT EXISTS traces (
    Timestamp          TIMESTAMP,
    TraceId            VARCHAR,
    SpanId             VARCHAR,
    ParentSpanId       VARCHAR,
    TraceState         VARCHAR,
    SpanName           VARCHAR,
    SpanKind           VARCHAR,
    ServiceName        VARCHAR,
    ResourceAttributes VARCHAR,
    ScopeName          VARCHAR,
    ScopeVersion       VARCHAR,
    SpanAttributes     VARCHAR,
    Duration           BIGINT,
    StatusCode         VARCHAR,
    StatusMessage      VARCHAR,
    Events             VARCHAR,
    Links              VARCHAR
)
"#;

const CREATE_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS logs (
    Timestamp          TIMESTAMP,
    TraceId            VARCHAR,
    SpanId             VARCHAR,
    SeverityNumber     SMALLINT,
    SeverityText       VARCHAR,
    Body               VARCHAR,
    ServiceName        VARCHAR,
    ResourceAttributes VARCHAR,
    LogAttributes      VARCHAR
)
"#;

const CREATE_METRICS: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    Timestamp          TIMESTAMP,
    MetricName         VARCHAR,
    MetricDescription  VARCHAR,
    MetricUnit         VARCHAR,
    MetricType         VARCHAR,
    Value              DOUBLE,
    ServiceName        VARCHAR,
    ResourceAttributes VARCHAR,
    MetricAttributes   VARCHAR
)
"#;

/// JSON object string from an ordered attribute map
fn attrs_to_json(attrs: &AttrMap) -> String {
    let map: serde_json::Map<String, serde_json::Value> = attrs
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}

/// JSON array string for the events of a span row
fn events_to_json(row: &TraceRow) -> String {
    let events: Vec<serde_json::Value> = row
        .event_timestamps
        .iter()
        .zip(row.event_names.iter())
        .zip(row.event_attributes.iter())
        .map(|((ts, name), attrs)| {
            serde_json::json!({
                "timestamp": format_sql_timestamp(datetime_from_unix_nanos(*ts as u64)),
                "name": name,
                "attributes": serde_json::from_str::<serde_json::Value>(&attrs_to_json(attrs))
                    .unwrap_or(serde_json::Value::Null),
            })
        })
        .collect();
    serde_json::to_string(&events).unwrap_or_else(|_| "[]".to_string())
}

/// JSON array string for the links of a span row
fn links_to_json(row: &TraceRow) -> String {
    let links: Vec<serde_json::Value> = row
        .link_trace_ids
        .iter()
        .zip(row.link_span_ids.iter())
        .zip(row.link_trace_states.iter())
        .zip(row.link_attributes.iter())
        .map(|(((trace_id, span_id), trace_state), attrs)| {
            serde_json::json!({
                "trace_id": trace_id,
                "span_id": span_id,
                "trace_state": trace_state,
                "attributes": serde_json::from_str::<serde_json::Value>(&attrs_to_json(attrs))
                    .unwrap_or(serde_json::Value::Null),
            })
        })
        .collect();
    serde_json::to_string(&links).unwrap_or_else(|_| "[]".to_string())
}

/// A session's private database plus its directory
pub struct SessionDb {
    dir: PathBuf,
    conn: Connection,
}

impl SessionDb {
    /// Create the session directory and an empty database with all tables
    pub fn create(session_root: &Path, session_id: &str) -> Result<Self, SessionDbError> {
        let dir = session_root.join(session_id);
        std::fs::create_dir_all(&dir)?;

        let db_path = dir.join(SESSION_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(CREATE_TRACES)?;
        conn.execute_batch(CREATE_LOGS)?;
        conn.execute_batch(CREATE_METRICS)?;

        tracing::debug!(path = %db_path.display(), "Session database created");
        Ok(Self { dir, conn })
    }

    /// Session directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append span rows; returns the number written
    pub fn append_traces(&self, rows: &[TraceRow]) -> Result<u64, SessionDbError> {
        let mut appender = self.conn.appender("traces")?;
        for row in rows {
            appender.append_row(params![
                format_sql_timestamp(row.timestamp),
                row.trace_id.as_str(),
                row.span_id.as_str(),
                row.parent_span_id.as_str(),
                row.trace_state.as_str(),
                row.span_name.as_str(),
                row.span_kind.as_str(),
                row.service_name.as_str(),
                attrs_to_json(&row.resource_attributes),
                row.scope_name.as_str(),
                row.scope_version.as_str(),
                attrs_to_json(&row.span_attributes),
                row.duration as i64,
                row.status_code.as_str(),
                row.status_message.as_str(),
                events_to_json(row),
                links_to_json(row),
            ])?;
        }
        Ok(rows.len() as u64)
    }

    /// Append log rows; returns the number written
    pub fn append_logs(&self, rows: &[LogRow]) -> Result<u64, SessionDbError> {
        let mut appender = self.conn.appender("logs")?;
        for row in rows {
            appender.append_row(params![
                format_sql_timestamp(row.timestamp),
                row.trace_id.as_str(),
                row.span_id.as_str(),
                row.severity_number as i16,
                row.severity_text.as_str(),
                row.body.as_str(),
                row.service_name.as_str(),
                attrs_to_json(&row.resource_attributes),
                attrs_to_json(&row.log_attributes),
            ])?;
        }
        Ok(rows.len() as u64)
    }

    /// Append metric rows; returns the number written
    pub fn append_metrics(&self, rows: &[MetricRow]) -> Result<u64, SessionDbError> {
        let mut appender = self.conn.appender("metrics")?;
        for row in rows {
            appender.append_row(params![
                format_sql_timestamp(row.timestamp),
                row.metric_name.as_str(),
                row.metric_description.as_str(),
                row.metric_unit.as_str(),
                row.metric_type.as_str(),
                row.value,
                row.service_name.as_str(),
                attrs_to_json(&row.resource_attributes),
                attrs_to_json(&row.metric_attributes),
            ])?;
        }
        Ok(rows.len() as u64)
    }

    /// Row count of one session table
    pub fn table_count(&self, table: &str) -> Result<u64, SessionDbError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM {}", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Build the manifest by querying the session database itself.
    /// Empty tables are omitted.
    pub fn manifest(&self) -> Result<SessionManifest, SessionDbError> {
        let mut manifest = SessionManifest::new();

        for table in SESSION_TABLES {
            let row_count = self.table_count(table)?;
            if row_count == 0 {
                continue;
            }

            let columns = self.table_columns(table)?;
            let sample_rows = self.sample_rows(table, &columns)?;

            manifest.insert(
                table.to_string(),
                TableManifest {
                    row_count,
                    columns,
                    sample_rows,
                },
            );
        }

        Ok(manifest)
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, SessionDbError> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map(params![table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn sample_rows(
        &self,
        table: &str,
        columns: &[ColumnInfo],
    ) -> Result<Vec<BTreeMap<String, String>>, SessionDbError> {
        // COLUMNS(*)::VARCHAR renders every value as text in declaration
        // order, which matches the ordinal-ordered column list.
        let mut stmt = self.conn.prepare(&format!(
            "SELECT COLUMNS(*)::VARCHAR FROM {} LIMIT {}",
            table, MANIFEST_SAMPLE_ROWS
        ))?;

        let mut rows = stmt.query([])?;
        let mut samples = Vec::new();
        while let Some(row) = rows.next()? {
            let mut sample = BTreeMap::new();
            for (idx, column) in columns.iter().enumerate() {
                let value: Option<String> = row.get(idx)?;
                sample.insert(column.name.clone(), value.unwrap_or_default());
            }
            samples.push(sample);
        }
        Ok(samples)
    }

    /// Close the database connection, flushing the WAL
    pub fn close(self) -> Result<(), SessionDbError> {
        self.conn
            .close()
            .map_err(|(_, e)| SessionDbError::Database(e))?;
        Ok(())
    }

    /// Remove a session's directory and everything inside it. Idempotent.
    pub fn remove(session_root: &Path, session_id: &str) -> Result<(), SessionDbError> {
        let dir = session_root.join(session_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            tracing::debug!(dir = %dir.display(), "Session directory removed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::datetime_from_unix_nanos;

    fn make_trace_row(span_id: &str, service: &str) -> TraceRow {
        TraceRow {
            timestamp: datetime_from_unix_nanos(1_700_000_000_000_000_000),
            trace_id: "aaaabbbbccccddddeeeeffff00001111".to_string(),
            span_id: span_id.to_string(),
            parent_span_id: String::new(),
            trace_state: String::new(),
            span_name: "verify_jwt".to_string(),
            span_kind: "INTERNAL".to_string(),
            service_name: service.to_string(),
            resource_attributes: vec![("service.name".to_string(), service.to_string())],
            scope_name: String::new(),
            scope_version: String::new(),
            span_attributes: vec![("user.id".to_string(), "u1".to_string())],
            duration: 1_500_000,
            status_code: "OK".to_string(),
            status_message: String::new(),
            event_timestamps: vec![1_700_000_000_000_500_000],
            event_names: vec!["token.checked".to_string()],
            event_attributes: vec![vec![]],
            link_trace_ids: vec![],
            link_span_ids: vec![],
            link_trace_states: vec![],
            link_attributes: vec![],
        }
    }

    #[test]
    fn test_create_append_and_count() {
        let root = tempfile::tempdir().unwrap();
        let db = SessionDb::create(root.path(), "abc123def456").unwrap();

        let rows = vec![
            make_trace_row("0000000000000001", "auth-service"),
            make_trace_row("0000000000000002", "auth-service"),
        ];
        assert_eq!(db.append_traces(&rows).unwrap(), 2);
        assert_eq!(db.table_count("traces").unwrap(), 2);
        assert_eq!(db.table_count("logs").unwrap(), 0);
    }

    #[test]
    fn test_manifest_skips_empty_tables() {
        let root = tempfile::tempdir().unwrap();
        let db = SessionDb::create(root.path(), "abc123def456").unwrap();
        db.append_traces(&[make_trace_row("0000000000000001", "auth-service")])
            .unwrap();

        let manifest = db.manifest().unwrap();
        assert!(manifest.contains_key("traces"));
        assert!(!manifest.contains_key("logs"));
        assert!(!manifest.contains_key("metrics"));
    }

    #[test]
    fn test_manifest_columns_and_samples() {
        let root = tempfile::tempdir().unwrap();
        let db = SessionDb::create(root.path(), "abc123def456").unwrap();
        let rows: Vec<TraceRow> = (0..5)
            .map(|i| make_trace_row(&format!("000000000000000{}", i), "auth-service"))
            .collect();
        db.append_traces(&rows).unwrap();

        let manifest = db.manifest().unwrap();
        let traces = &manifest["traces"];
        assert_eq!(traces.row_count, 5);
        assert_eq!(traces.sample_rows.len(), MANIFEST_SAMPLE_ROWS);

        let names: Vec<&str> = traces.columns.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"Timestamp"));
        assert!(names.contains(&"SpanAttributes"));
        assert!(names.contains(&"Events"));

        let sample = &traces.sample_rows[0];
        assert_eq!(sample["ServiceName"], "auth-service");
        assert_eq!(sample["StatusCode"], "OK");
    }

    #[test]
    fn test_empty_manifest_for_empty_session() {
        let root = tempfile::tempdir().unwrap();
        let db = SessionDb::create(root.path(), "empty0session").unwrap();
        assert!(db.manifest().unwrap().is_empty());
    }

    #[test]
    fn test_remove_deletes_directory() {
        let root = tempfile::tempdir().unwrap();
        let db = SessionDb::create(root.path(), "doomed000001").unwrap();
        let dir = db.dir().to_path_buf();
        db.close().unwrap();
        assert!(dir.exists());

        SessionDb::remove(root.path(), "doomed000001").unwrap();
        assert!(!dir.exists());

        // Removing again is a no-op
        SessionDb::remove(root.path(), "doomed000001").unwrap();
    }

    #[test]
    fn test_attrs_to_json_preserves_order() {
        let attrs = vec![
            ("zebra".to_string(), "1".to_string()),
            ("alpha".to_string(), "2".to_string()),
        ];
        assert_eq!(attrs_to_json(&attrs), r#"{"zebra":"1","alpha":"2"}"#);
    }
}
