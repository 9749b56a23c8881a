//! Session types and errors

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::clickhouse::ClickhouseError;
use crate::data::objectstore::ObjectStoreError;
use crate::data::sessiondb::SessionDbError;
use crate::data::types::SessionManifest;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session is not ready (status: {status})")]
    NotReady { status: SessionStatus },

    #[error(transparent)]
    Warehouse(#[from] ClickhouseError),

    #[error(transparent)]
    Store(#[from] SessionDbError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error("Build task failed: {0}")]
    BuildFailed(String),
}

/// Session lifecycle state. The only transitions are
/// `building -> ready` and `building -> error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Building,
    Ready,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Building => write!(f, "building"),
            SessionStatus::Ready => write!(f, "ready"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// Signals a session can materialize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Traces,
    Logs,
    Metrics,
}

impl SignalType {
    /// Session table (and counts key) for this signal
    pub fn table_name(&self) -> &'static str {
        match self {
            SignalType::Traces => "traces",
            SignalType::Logs => "logs",
            SignalType::Metrics => "metrics",
        }
    }
}

fn all_signal_types() -> Vec<SignalType> {
    vec![SignalType::Traces, SignalType::Logs, SignalType::Metrics]
}

/// A request to materialize a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Service names to include; empty means all services
    #[serde(default)]
    pub services: Vec<String>,
    /// Signals to materialize; defaults to all three
    #[serde(default = "all_signal_types")]
    pub signal_types: Vec<SignalType>,
    /// Inclusive window start
    pub start_time: DateTime<Utc>,
    /// Inclusive window end
    pub end_time: DateTime<Utc>,
}

/// One turn of the analysis conversation attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Result of a successful materialization
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Rows materialized per requested signal
    pub counts: BTreeMap<String, u64>,
    pub manifest: SessionManifest,
}

/// Registry state of one session. Only the owner may observe or mutate it.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub id: String,
    pub owner: String,
    pub status: SessionStatus,
    pub services: Vec<String>,
    pub signal_types: Vec<SignalType>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Populated when the build completes
    pub counts: BTreeMap<String, u64>,
    pub manifest: Option<SessionManifest>,
    pub error: Option<String>,
    pub conversation: Vec<ConversationTurn>,
}
