//! Relational loader.
//!
//! Loads projected relations into a target store in four gated stages:
//! create tables, truncate and bulk insert, add unique constraints, add
//! foreign keys. The target is abstracted by [`TargetStore`], implemented for
//! PostgreSQL and for an in-memory store used by dry runs.

pub mod ddl;
pub mod error;
pub mod loader;
pub mod memory;
pub mod payload;
pub mod postgres;
pub mod store;

pub use error::{LoadError, StoreError};
pub use loader::{
    ConstraintKind, ConstraintOutcome, ConstraintResult, LoadInputs, LoadReport, RelationLoad,
    RelationOutcome, RelationalLoader,
};
pub use memory::MemoryStore;
pub use payload::{CopyPayload, encode_chunk};
pub use postgres::{PgStore, mask_database_url};
pub use store::TargetStore;
