//! Object store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("Object store error: {0}")]
    Backend(String),

    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Object decode error for {key}: {error}")]
    Decode { key: String, error: String },
}
