use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("business key column '{column}' not found")]
    MissingKeyColumn { column: String },

    #[error("failed to read rule set {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rule set {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for NormalizeError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::DataFrame {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NormalizeError>;
