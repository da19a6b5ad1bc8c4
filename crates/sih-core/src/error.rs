use thiserror::Error;

use sih_ingest::IngestError;
use sih_transform::NormalizeError;

#[derive(Debug, Error)]
pub enum AggregateError {
    /// A business key survived the final merge more than once.
    #[error("{count} business keys remain duplicated after the final merge (first: {first})")]
    DuplicateKeys { count: usize, first: i64 },

    #[error("no input chunks to aggregate")]
    NoInput,

    #[error("column '{column}' required by the merge policy is missing")]
    MissingColumn { column: String },

    #[error("business key column '{column}' must be a 64-bit integer, found {dtype}")]
    KeyType { column: String, dtype: String },

    #[error("corrupt partial state in column '{column}': {message}")]
    PartialState { column: String, message: String },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for AggregateError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectError {
    /// Source columns absent from the aggregated set; the relation is skipped.
    #[error("relation {relation} is missing source columns: {}", columns.join(", "))]
    MissingColumns {
        relation: String,
        columns: Vec<String>,
    },

    #[error("relation {relation} is not projected from the aggregated set")]
    NotProjected { relation: String },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for ProjectError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}
