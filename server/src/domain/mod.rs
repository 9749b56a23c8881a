//! Domain logic
//!
//! - `loader` - object-store to warehouse ingestion pipelines
//! - `enricher` - embedding enrichment of landed spans
//! - `session` - per-user session materialization and registry

pub mod enricher;
pub mod loader;
pub mod session;

pub use enricher::EnricherService;
pub use loader::LoaderService;
pub use session::{SessionBuilder, SessionRegistry};
