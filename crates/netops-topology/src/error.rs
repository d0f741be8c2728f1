use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("No execution data found: {0}")]
    NoData(String),

    #[error("Serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}
