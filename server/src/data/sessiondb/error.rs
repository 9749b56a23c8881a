//! Session database error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionDbError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing dir");
        let err: SessionDbError = io_err.into();
        assert!(err.to_string().contains("missing dir"));
    }
}
