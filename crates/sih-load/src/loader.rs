//! Staged relational load.
//!
//! 1. Create every table, in dependency order.
//! 2. Per relation, in dependency order: truncate, coerce to declared types,
//!    bulk insert in fixed-size chunks. Absent or empty artifacts are skipped
//!    without touching the table.
//! 3. Add unique constraints that are not present yet.
//! 4. Add foreign keys that are not present yet.
//!
//! Stages 1 and 2 abort on the first failure; constraint failures in stages 3
//! and 4 are recorded and logged.

use std::path::{Path, PathBuf};
use std::time::Instant;

use polars::chunked_array::cast::CastOptions;
use polars::prelude::{Column, DataFrame};
use sih_ingest::ChunkReader;
use sih_model::{CopyOptions, RelationSchema};
use sih_standards::SchemaRegistry;
use tracing::{debug, info, warn};

use crate::ddl::{foreign_key_name, unique_constraint_name};
use crate::error::{LoadError, StoreError};
use crate::payload::encode_chunk;
use crate::store::TargetStore;

/// Where relation artifacts are read from.
#[derive(Debug, Clone)]
pub struct LoadInputs {
    pub processed_dir: PathBuf,
    /// Externally produced lookup relations.
    pub reference_dir: PathBuf,
}

impl LoadInputs {
    pub fn artifact_for(&self, relation: &RelationSchema) -> PathBuf {
        let dir = if relation.is_reference() {
            &self.reference_dir
        } else {
            &self.processed_dir
        };
        dir.join(format!("{}.parquet", relation.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationOutcome {
    Loaded {
        rows: u64,
        chunks: usize,
        /// Values that became null when cast to the declared type.
        coerced: usize,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationLoad {
    pub relation: String,
    pub outcome: RelationOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOutcome {
    Added,
    AlreadyPresent,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintResult {
    pub name: String,
    pub table: String,
    pub kind: ConstraintKind,
    pub outcome: ConstraintOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub relations: Vec<RelationLoad>,
    pub constraints: Vec<ConstraintResult>,
}

impl LoadReport {
    pub fn rows_loaded(&self) -> u64 {
        self.relations
            .iter()
            .map(|r| match r.outcome {
                RelationOutcome::Loaded { rows, .. } => rows,
                RelationOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn failed_constraints(&self) -> impl Iterator<Item = &ConstraintResult> {
        self.constraints
            .iter()
            .filter(|c| matches!(c.outcome, ConstraintOutcome::Failed { .. }))
    }
}

pub struct RelationalLoader<'a, S> {
    store: &'a mut S,
    registry: &'a SchemaRegistry,
    options: CopyOptions,
}

impl<'a, S: TargetStore> RelationalLoader<'a, S> {
    pub fn new(store: &'a mut S, registry: &'a SchemaRegistry, options: CopyOptions) -> Self {
        Self {
            store,
            registry,
            options,
        }
    }

    /// Runs all four stages.
    pub async fn run(&mut self, inputs: &LoadInputs) -> Result<LoadReport, LoadError> {
        let started = Instant::now();
        self.create_schema().await?;

        let registry = self.registry;
        let mut report = LoadReport::default();
        for relation in registry.ordered() {
            let path = inputs.artifact_for(relation);
            report.relations.push(self.load_relation(relation, &path).await?);
        }

        report.constraints.extend(self.add_unique_constraints().await);
        report.constraints.extend(self.add_foreign_keys().await);
        info!(
            relations = report.relations.len(),
            rows = report.rows_loaded(),
            failed_constraints = report.failed_constraints().count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "load complete"
        );
        Ok(report)
    }

    pub async fn create_schema(&mut self) -> Result<(), LoadError> {
        let registry = self.registry;
        for relation in registry.ordered() {
            self.store
                .create_table(relation)
                .await
                .map_err(|source| LoadError::CreateTable {
                    relation: relation.name.clone(),
                    source,
                })?;
            debug!(relation = %relation.name, "table ready");
        }
        info!(tables = registry.relations().len(), "schema created");
        Ok(())
    }

    /// Replaces the contents of one table with the rows of `path`.
    pub async fn load_relation(&mut self, relation: &RelationSchema, path: &Path) -> Result<RelationLoad, LoadError> {
        let skipped = |reason: &str| {
            warn!(relation = %relation.name, path = %path.display(), reason, "skipping relation");
            Ok(RelationLoad {
                relation: relation.name.clone(),
                outcome: RelationOutcome::Skipped {
                    reason: reason.to_string(),
                },
            })
        };
        if !path.exists() {
            return skipped("artifact not found");
        }
        let mut reader = ChunkReader::artifact(path, self.options.chunk_size);
        let first = match reader.next() {
            Some(chunk) => chunk?,
            None => return skipped("artifact is empty"),
        };
        if first.height() == 0 {
            return skipped("artifact is empty");
        }
        let missing: Vec<String> = relation
            .column_names()
            .into_iter()
            .filter(|name| first.column(name).is_err())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns {
                relation: relation.name.clone(),
                columns: missing,
            });
        }

        self.store
            .truncate(&relation.name)
            .await
            .map_err(|source| LoadError::Truncate {
                relation: relation.name.clone(),
                source,
            })?;

        let columns: Vec<String> = relation.column_names().into_iter().map(str::to_string).collect();
        let mut rows = 0;
        let mut chunks = 0;
        let mut coerced = 0;
        for chunk in std::iter::once(Ok(first)).chain(reader) {
            let (frame, nulls) = coerce(relation, &chunk?)?;
            coerced += nulls;
            let payload = encode_chunk(&relation.name, &frame, &columns, &self.options)?;
            let written = self
                .store
                .copy_chunk(&relation.name, &columns, payload, &self.options)
                .await
                .map_err(|source| LoadError::ChunkInsert {
                    relation: relation.name.clone(),
                    chunk: chunks,
                    source,
                })?;
            rows += written;
            chunks += 1;
            debug!(relation = %relation.name, chunk = chunks, rows = written, "chunk committed");
        }
        if coerced > 0 {
            warn!(relation = %relation.name, count = coerced, "coercion fallback during load");
        }
        info!(relation = %relation.name, rows, chunks, "relation loaded");
        Ok(RelationLoad {
            relation: relation.name.clone(),
            outcome: RelationOutcome::Loaded {
                rows,
                chunks,
                coerced,
            },
        })
    }

    pub async fn add_unique_constraints(&mut self) -> Vec<ConstraintResult> {
        let registry = self.registry;
        let mut results = Vec::new();
        for relation in registry.ordered() {
            for columns in &relation.uniques {
                let name = unique_constraint_name(&relation.name, columns);
                let outcome = match self.store.constraint_exists(&name).await {
                    Ok(true) => ConstraintOutcome::AlreadyPresent,
                    Ok(false) => constraint_outcome(self.store.add_unique(&relation.name, &name, columns).await),
                    Err(error) => constraint_outcome(Err(error)),
                };
                results.push(record(&relation.name, name, ConstraintKind::Unique, outcome));
            }
        }
        results
    }

    pub async fn add_foreign_keys(&mut self) -> Vec<ConstraintResult> {
        let registry = self.registry;
        let mut results = Vec::new();
        for relation in registry.ordered() {
            for fk in &relation.foreign_keys {
                let name = foreign_key_name(&relation.name, fk);
                let outcome = match self.store.constraint_exists(&name).await {
                    Ok(true) => ConstraintOutcome::AlreadyPresent,
                    Ok(false) => constraint_outcome(self.store.add_foreign_key(&relation.name, &name, fk).await),
                    Err(error) => constraint_outcome(Err(error)),
                };
                results.push(record(&relation.name, name, ConstraintKind::ForeignKey, outcome));
            }
        }
        results
    }
}

fn constraint_outcome(result: Result<(), StoreError>) -> ConstraintOutcome {
    match result {
        Ok(()) => ConstraintOutcome::Added,
        Err(error) => ConstraintOutcome::Failed {
            error: error.to_string(),
        },
    }
}

fn record(table: &str, name: String, kind: ConstraintKind, outcome: ConstraintOutcome) -> ConstraintResult {
    match &outcome {
        ConstraintOutcome::Failed { error } => {
            warn!(table, constraint = %name, %error, "constraint not added");
        }
        ConstraintOutcome::Added => debug!(table, constraint = %name, "constraint added"),
        ConstraintOutcome::AlreadyPresent => {}
    }
    ConstraintResult {
        name,
        table: table.to_string(),
        kind,
        outcome,
    }
}

/// Casts declared columns to their semantic types, in declaration order.
/// Returns the frame and the number of values lost to the cast.
fn coerce(relation: &RelationSchema, frame: &DataFrame) -> Result<(DataFrame, usize), LoadError> {
    let mut lost = 0;
    let mut columns: Vec<Column> = Vec::with_capacity(relation.columns.len());
    for def in &relation.columns {
        let source = frame.column(&def.name)?;
        let dtype = def.semantic.dtype();
        let cast = if source.dtype() == &dtype {
            source.clone()
        } else {
            source.cast_with_options(&dtype, CastOptions::NonStrict)?
        };
        lost += cast.null_count().saturating_sub(source.null_count());
        columns.push(cast);
    }
    Ok((DataFrame::new(columns)?, lost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{DataType, IntoColumn, NamedFrom, Series};
    use sih_model::SemanticType;

    #[test]
    fn coerce_counts_values_lost_to_cast() {
        let relation = RelationSchema::new("t")
            .column("A", SemanticType::SmallInt)
            .column("B", SemanticType::Code);
        let frame = DataFrame::new(vec![
            Series::new("B".into(), [1i64, 2]).into_column(),
            Series::new("A".into(), [Some("7"), Some("x")]).into_column(),
        ])
        .unwrap();
        let (out, lost) = coerce(&relation, &frame).unwrap();
        assert_eq!(lost, 1);
        assert_eq!(out.get_column_names_str(), vec!["A", "B"]);
        assert_eq!(out.column("A").unwrap().dtype(), &DataType::Int16);
        assert_eq!(out.column("B").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn reference_relations_read_from_reference_dir() {
        let inputs = LoadInputs {
            processed_dir: PathBuf::from("processed"),
            reference_dir: PathBuf::from("reference"),
        };
        let reference = RelationSchema::new("cid10");
        assert_eq!(
            inputs.artifact_for(&reference),
            PathBuf::from("reference/cid10.parquet")
        );
    }
}
