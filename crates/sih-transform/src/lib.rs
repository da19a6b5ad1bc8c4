//! Field normalization for hospital admission records.
//!
//! - **rules**: named, versioned rule sets keyed by column name
//! - **kernels**: whole-column implementations of each rule kind
//! - **derived**: total value, length of stay, and age recomputation
//! - **normalizer**: applies a rule set to a raw chunk

pub mod derived;
pub mod error;
pub mod kernels;
pub mod normalizer;
pub mod rules;

pub use derived::{DerivedField, apply_derived};
pub use error::{NormalizeError, Result};
pub use normalizer::{CoercionFallback, FieldNormalizer, NormalizedBatch, merge_fallbacks};
pub use rules::{CodeRule, FieldRule, Generalization, Pad, RuleSet};
