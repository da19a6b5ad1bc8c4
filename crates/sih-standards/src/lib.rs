//! Schema Registry for the SIH relational model.
//!
//! The registry is a static, immutable catalog of output relations. It is
//! consulted by the projector (which columns each relation takes) and by the
//! loader (DDL, coercion types, creation and constraint order).

pub mod catalog;
pub mod error;
pub mod registry;

pub use catalog::{BUSINESS_KEY, INPUT_COLUMNS, standard_relations};
pub use error::SchemaError;
pub use registry::SchemaRegistry;
