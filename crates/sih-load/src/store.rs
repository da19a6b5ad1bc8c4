use sih_model::{CopyOptions, ForeignKey, RelationSchema};

use crate::error::StoreError;
use crate::payload::CopyPayload;

/// Operations the loader needs from a relational target.
///
/// Calls are issued sequentially over one long-lived session.
#[allow(async_fn_in_trait)]
pub trait TargetStore {
    /// Creates the table when it does not exist yet.
    async fn create_table(&mut self, relation: &RelationSchema) -> Result<(), StoreError>;

    /// Empties the table and every table referencing it.
    async fn truncate(&mut self, table: &str) -> Result<(), StoreError>;

    /// Inserts one chunk in its own transaction and returns the rows written.
    async fn copy_chunk(
        &mut self,
        table: &str,
        columns: &[String],
        payload: CopyPayload,
        options: &CopyOptions,
    ) -> Result<u64, StoreError>;

    async fn constraint_exists(&mut self, name: &str) -> Result<bool, StoreError>;

    async fn add_unique(&mut self, table: &str, name: &str, columns: &[String]) -> Result<(), StoreError>;

    async fn add_foreign_key(&mut self, table: &str, name: &str, fk: &ForeignKey) -> Result<(), StoreError>;
}
