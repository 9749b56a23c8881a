//! Telemetry data plane: object-store loader, embedding enricher, and the
//! session materialization engine.

pub mod app;
pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
