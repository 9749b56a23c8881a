//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;

pub use crate::app::CoreApp;
pub use cli::{Cli, Commands};
pub use config::{
    AppConfig, ClickhouseConfig, EnricherConfig, LoaderConfig, S3Config, SessionConfig,
};
pub use shutdown::Shutdown;
