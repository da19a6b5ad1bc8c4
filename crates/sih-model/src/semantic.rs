//! Semantic column types shared by the normalizer, the registry, and the loader.

use polars::prelude::DataType;
use serde::{Deserialize, Serialize};

/// Declared type of a relation column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// 16-bit integer (flags, small counts, ages).
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer (business keys).
    BigInt,
    /// Floating point (money, averaged utilization fields).
    Decimal,
    /// Free text.
    Text,
    /// Fixed-width code with a `"0"` sentinel for unknown.
    Code,
    /// Calendar date.
    Date,
}

impl SemanticType {
    /// Polars dtype a column of this type is coerced to before loading.
    pub fn dtype(self) -> DataType {
        match self {
            Self::SmallInt => DataType::Int16,
            Self::Integer => DataType::Int32,
            Self::BigInt => DataType::Int64,
            Self::Decimal => DataType::Float64,
            Self::Text | Self::Code => DataType::String,
            Self::Date => DataType::Date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_strings() {
        assert_eq!(SemanticType::Code.dtype(), DataType::String);
        assert_eq!(SemanticType::Decimal.dtype(), DataType::Float64);
    }
}
