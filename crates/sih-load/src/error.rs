use thiserror::Error;

use sih_ingest::IngestError;
use sih_standards::SchemaError;

/// Failure reported by a target store operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to connect to target store: {0}")]
    Connect(#[source] StoreError),

    #[error("failed to create table {relation}: {source}")]
    CreateTable {
        relation: String,
        #[source]
        source: StoreError,
    },

    /// A table that could not be emptied would receive duplicate rows.
    #[error("failed to truncate {relation}: {source}")]
    Truncate {
        relation: String,
        #[source]
        source: StoreError,
    },

    #[error("artifact for {relation} lacks declared columns: {}", columns.join(", "))]
    MissingColumns {
        relation: String,
        columns: Vec<String>,
    },

    /// Bulk insert of one chunk failed; chunks committed earlier stay applied.
    #[error("chunk {chunk} of {relation} failed to load: {source}")]
    ChunkInsert {
        relation: String,
        chunk: usize,
        #[source]
        source: StoreError,
    },

    #[error("failed to encode COPY payload for {relation}: {message}")]
    Payload { relation: String, message: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for LoadError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}
