//! Configuration options for the aggregation and load stages.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How duplicate business keys are contracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationStrategy {
    /// Fold every normalized chunk into one in-memory grouping.
    SinglePass,
    /// Write per-chunk partial results to scratch and merge them in rounds.
    #[default]
    Chunked,
}

impl fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinglePass => f.write_str("single-pass"),
            Self::Chunked => f.write_str("chunked"),
        }
    }
}

/// Options for the key aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateOptions {
    pub strategy: AggregationStrategy,
    /// Maximum rows read per raw chunk.
    pub chunk_size: usize,
    /// Number of partial results merged per group in each merge round.
    pub merge_fan_in: usize,
    /// Parent directory of the per-run scratch area (OS temp dir when unset).
    pub scratch_dir: Option<PathBuf>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            strategy: AggregationStrategy::default(),
            chunk_size: 100_000,
            merge_fan_in: 5,
            scratch_dir: None,
        }
    }
}

impl AggregateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_merge_fan_in(mut self, fan_in: usize) -> Self {
        self.merge_fan_in = fan_in.max(2);
        self
    }

    #[must_use]
    pub fn with_scratch_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scratch_dir = dir;
        self
    }
}

/// Options for the delimited bulk-insert stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyOptions {
    /// Rows per committed insert chunk.
    pub chunk_size: usize,
    pub delimiter: char,
    /// Text written for null values.
    pub null: String,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            chunk_size: 50_000,
            delimiter: ',',
            null: String::new(),
        }
    }
}

impl CopyOptions {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_null(mut self, null: &str) -> Self {
        self.null = null.to_string();
        self
    }
}
