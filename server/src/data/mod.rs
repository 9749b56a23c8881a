//! Data storage layer
//!
//! - `clickhouse` - warehouse holding the raw and enriched telemetry tables
//! - `objectstore` - S3-compatible bucket the telemetry files land in
//! - `sessiondb` - per-session DuckDB materializations
//! - `types` - shared record types across all backends

pub mod clickhouse;
pub mod objectstore;
pub mod sessiondb;
pub mod types;

pub use clickhouse::{ClickhouseError, ClickhouseService};
pub use objectstore::{ObjectStore, ObjectStoreError};
pub use sessiondb::{SessionDb, SessionDbError};
