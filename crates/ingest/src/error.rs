use polyhouse_polygon::PolygonError;
use polyhouse_schemas::{EnumKind, SchemaError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query failed: {status} - {message}")]
    Query { status: u16, message: String },

    #[error("storage task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] PolygonError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The registry is stale relative to upstream.
    #[error("unknown {kind} enum code {code}")]
    UnknownEnumCode { kind: EnumKind, code: i64 },

    #[error("schema error: {0}")]
    Schema(SchemaError),

    #[error("cannot encode trade id '{id}': {reason}")]
    IdEncoding { id: String, reason: String },

    #[error("invalid {field} '{value}' for {symbol}")]
    InvalidField {
        symbol: String,
        field: &'static str,
        value: String,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetch worker failed: {0}")]
    Worker(String),

    #[error("ingestion cancelled")]
    Cancelled,
}

impl From<SchemaError> for IngestError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::UnknownCode { kind, code } => IngestError::UnknownEnumCode { kind, code },
            other => IngestError::Schema(other),
        }
    }
}

impl IngestError {
    /// Cancellation is a consequence of another failure, never the cause.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IngestError::Cancelled)
    }
}
