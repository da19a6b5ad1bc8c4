//! Key aggregation and relation projection.
//!
//! The aggregator contracts normalized records sharing a business key into
//! one canonical record; the projector splits the canonical set into the
//! relations declared by the schema registry.

pub mod aggregator;
pub mod error;
pub mod merge;
pub mod projector;

pub use aggregator::{AggregateReport, Aggregated, KeyAggregator};
pub use error::{AggregateError, ProjectError};
pub use merge::{Layout, MergeKind, MergePolicy, ModeTally, PartialAggregate, verify_unique_keys};
pub use projector::{ProjectionOutcome, RelationResult, TableProjector};
