//! Session engine
//!
//! Carves a read-only, time- and service-scoped slice of the warehouse into
//! a per-session DuckDB database, tracked by a process-wide registry. The
//! HTTP surface and the SQL-generating consumer live outside this crate;
//! they drive the registry and builder through this module's API.

pub mod builder;
pub mod registry;
pub mod types;

pub use builder::{SessionBuilder, SessionMaterializer};
pub use registry::SessionRegistry;
pub use types::{
    BuildOutput, ConversationTurn, SessionDescriptor, SessionError, SessionRequest, SessionStatus,
    SignalType,
};
