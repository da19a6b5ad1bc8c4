//! Table projector.
//!
//! Splits the aggregated record set into the projected relations of a
//! [`SchemaRegistry`]. Each relation is selected, filtered, reshaped and
//! deduplicated by its primary key independently, so one failing relation
//! never prevents the others from being written.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use polars::prelude::{
    BooleanChunked, Column, DataFrame, DataType, IntoColumn, NamedFrom, PolarsResult, Series,
};
use sih_ingest::{replace_artifact, retire_artifact};
use sih_model::{Cell, Predicate, RelationSchema, Shape, cells_to_series, column_cells};
use sih_standards::SchemaRegistry;
use tracing::{debug, info, warn};

use crate::error::ProjectError;
use crate::merge::ModeTally;

type Result<T> = std::result::Result<T, ProjectError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Written { rows: usize },
    /// Source columns were missing; nothing was written.
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationResult {
    pub relation: String,
    pub outcome: ProjectionOutcome,
    pub path: PathBuf,
    /// Previous artifact renamed aside before writing.
    pub backup: Option<PathBuf>,
}

pub struct TableProjector<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> TableProjector<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Source columns `relation` reads from the aggregated set.
    pub fn required_columns(relation: &RelationSchema) -> Vec<String> {
        let Some(projection) = relation.projection() else {
            return Vec::new();
        };
        let mut required: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !required.iter().any(|r| r == name) {
                required.push(name.to_string());
            }
        };
        match &projection.shape {
            Shape::Unpivot {
                slots,
                label_column,
                value_column,
            } => {
                for name in relation.column_names() {
                    if name != label_column.as_str() && name != value_column.as_str() {
                        push(name);
                    }
                }
                for slot in slots {
                    push(slot);
                }
            }
            Shape::Plain | Shape::ModeByKey { .. } => {
                for name in relation.column_names() {
                    push(name);
                }
            }
        }
        if let Some(filter) = &projection.filter {
            for name in filter.columns() {
                push(name);
            }
        }
        required
    }

    /// Projects one relation from the aggregated set.
    pub fn project(&self, relation: &RelationSchema, aggregated: &DataFrame) -> Result<DataFrame> {
        let projection = relation
            .projection()
            .ok_or_else(|| ProjectError::NotProjected {
                relation: relation.name.clone(),
            })?;
        let missing: Vec<String> = Self::required_columns(relation)
            .into_iter()
            .filter(|name| aggregated.column(name).is_err())
            .collect();
        if !missing.is_empty() {
            return Err(ProjectError::MissingColumns {
                relation: relation.name.clone(),
                columns: missing,
            });
        }

        let filtered = match &projection.filter {
            Some(predicate) => {
                let mask = predicate_mask(predicate, aggregated)?;
                aggregated.filter(&mask)?
            }
            None => aggregated.clone(),
        };

        let shaped = match &projection.shape {
            Shape::Plain => filtered.select(relation.column_names())?,
            Shape::Unpivot {
                slots,
                label_column,
                value_column,
            } => unpivot(relation, &filtered, slots, label_column, value_column)?,
            Shape::ModeByKey { key } => mode_by_key(relation, &filtered, key)?,
        };
        let deduped = dedupe(&shaped, &relation.primary_key)?;
        debug!(
            relation = %relation.name,
            source_rows = aggregated.height(),
            filtered_rows = filtered.height(),
            rows = deduped.height(),
            "projected relation"
        );
        Ok(deduped)
    }

    /// Projects every relation and writes `<out_dir>/<relation>.parquet`.
    ///
    /// Missing source columns skip the relation; any other failure is
    /// recorded and the remaining relations still run. A relation that is
    /// not written has its previous artifact retired, so no later stage
    /// reads rows from an earlier run.
    pub fn project_all(&self, aggregated: &DataFrame, out_dir: &Path, backup: bool) -> Vec<RelationResult> {
        let mut results = Vec::new();
        for relation in self.registry.projected() {
            let path = out_dir.join(format!("{}.parquet", relation.name));
            let mut result = RelationResult {
                relation: relation.name.clone(),
                outcome: ProjectionOutcome::Written { rows: 0 },
                path: path.clone(),
                backup: None,
            };
            match self.project(relation, aggregated) {
                Ok(mut frame) => match replace_artifact(&mut frame, &path, backup) {
                    Ok(previous) => {
                        info!(relation = %relation.name, rows = frame.height(), "wrote relation");
                        result.outcome = ProjectionOutcome::Written {
                            rows: frame.height(),
                        };
                        result.backup = previous;
                    }
                    Err(error) => {
                        warn!(relation = %relation.name, %error, "failed to write relation");
                        result.outcome = ProjectionOutcome::Failed {
                            error: error.to_string(),
                        };
                    }
                },
                Err(error @ ProjectError::MissingColumns { .. }) => {
                    warn!(relation = %relation.name, %error, "skipping relation");
                    result.outcome = ProjectionOutcome::Skipped {
                        reason: error.to_string(),
                    };
                }
                Err(error) => {
                    warn!(relation = %relation.name, %error, "relation projection failed");
                    result.outcome = ProjectionOutcome::Failed {
                        error: error.to_string(),
                    };
                }
            }
            if !matches!(result.outcome, ProjectionOutcome::Written { .. }) {
                match retire_artifact(&path, backup) {
                    Ok(previous) => result.backup = result.backup.take().or(previous),
                    Err(error) => {
                        warn!(relation = %relation.name, %error, "failed to retire stale artifact");
                    }
                }
            }
            results.push(result);
        }
        results
    }
}

fn holds(predicate: &Predicate, row: usize, cells: &HashMap<&str, Vec<Cell>>) -> bool {
    let cell = |column: &str| cells.get(column).and_then(|values| values.get(row));
    match predicate {
        Predicate::Equals { column, value } => {
            cell(column).and_then(Cell::as_i64) == Some(*value)
        }
        Predicate::Positive { column } => cell(column)
            .and_then(Cell::as_f64)
            .is_some_and(|v| v > 0.0),
        Predicate::NotSentinel { column } => cell(column).is_some_and(|c| !c.is_sentinel()),
        Predicate::All { predicates } => predicates.iter().all(|p| holds(p, row, cells)),
    }
}

fn predicate_mask(predicate: &Predicate, frame: &DataFrame) -> Result<BooleanChunked> {
    let mut cells = HashMap::new();
    for name in predicate.columns() {
        if !cells.contains_key(name) {
            cells.insert(name, column_cells(frame.column(name)?)?);
        }
    }
    let mask: Vec<bool> = (0..frame.height())
        .map(|row| holds(predicate, row, &cells))
        .collect();
    Ok(BooleanChunked::new("mask".into(), mask))
}

/// Emits one `(..., label, value)` row per non-sentinel slot value, in row
/// then slot order.
fn unpivot(
    relation: &RelationSchema,
    frame: &DataFrame,
    slots: &[String],
    label_column: &str,
    value_column: &str,
) -> Result<DataFrame> {
    let slot_cells = slots
        .iter()
        .map(|slot| column_cells(frame.column(slot)?))
        .collect::<PolarsResult<Vec<_>>>()?;
    let mut picks: Vec<(usize, usize)> = Vec::new();
    for row in 0..frame.height() {
        for (slot_idx, cells) in slot_cells.iter().enumerate() {
            if !cells[row].is_sentinel() {
                picks.push((row, slot_idx));
            }
        }
    }

    let value_dtype = match slots.first() {
        Some(slot) => frame.column(slot)?.dtype().clone(),
        None => DataType::String,
    };
    let mut columns: Vec<Column> = Vec::with_capacity(relation.columns.len());
    for name in relation.column_names() {
        let series = if name == label_column {
            let labels: Vec<&str> = picks.iter().map(|&(_, s)| slots[s].as_str()).collect();
            Series::new(name.into(), labels)
        } else if name == value_column {
            let values: Vec<Cell> = picks
                .iter()
                .map(|&(row, s)| slot_cells[s][row].clone())
                .collect();
            cells_to_series(name, &values, &value_dtype)?
        } else {
            let source = frame.column(name)?;
            let cells = column_cells(source)?;
            let values: Vec<Cell> = picks.iter().map(|&(row, _)| cells[row].clone()).collect();
            cells_to_series(name, &values, source.dtype())?
        };
        columns.push(series.into_column());
    }
    Ok(DataFrame::new(columns)?)
}

/// One row per non-sentinel `key`, ordered by first sighting; every other
/// column resolves to its mode within the key.
fn mode_by_key(relation: &RelationSchema, frame: &DataFrame, key: &str) -> Result<DataFrame> {
    let keys = column_cells(frame.column(key)?)?;
    let attributes: Vec<&str> = relation
        .column_names()
        .into_iter()
        .filter(|name| *name != key)
        .collect();
    let attribute_cells = attributes
        .iter()
        .map(|name| column_cells(frame.column(name)?))
        .collect::<PolarsResult<Vec<_>>>()?;

    let mut order: Vec<Cell> = Vec::new();
    let mut groups: HashMap<String, Vec<ModeTally>> = HashMap::new();
    for (row, key_cell) in keys.iter().enumerate() {
        if key_cell.is_sentinel() {
            continue;
        }
        let tallies = groups.entry(key_cell.render()).or_insert_with(|| {
            order.push(key_cell.clone());
            vec![ModeTally::default(); attributes.len()]
        });
        for (tally, cells) in tallies.iter_mut().zip(&attribute_cells) {
            tally.observe(cells[row].clone(), row as u64);
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(relation.columns.len());
    for name in relation.column_names() {
        let source = frame.column(name)?;
        let values: Vec<Cell> = if name == key {
            order.clone()
        } else {
            let idx = attributes.iter().position(|a| *a == name).unwrap_or(0);
            order
                .iter()
                .map(|k| {
                    groups
                        .get(&k.render())
                        .map(|tallies| tallies[idx].resolve())
                        .unwrap_or_default()
                })
                .collect()
        };
        columns.push(cells_to_series(name, &values, source.dtype())?.into_column());
    }
    Ok(DataFrame::new(columns)?)
}

/// Keeps the first row of every primary-key value.
fn dedupe(frame: &DataFrame, primary_key: &[String]) -> Result<DataFrame> {
    if primary_key.is_empty() || frame.height() == 0 {
        return Ok(frame.clone());
    }
    let key_cells = primary_key
        .iter()
        .map(|name| column_cells(frame.column(name)?))
        .collect::<PolarsResult<Vec<_>>>()?;
    let mut seen = HashSet::with_capacity(frame.height());
    let mask: Vec<bool> = (0..frame.height())
        .map(|row| {
            let composite: Vec<String> = key_cells.iter().map(|cells| cells[row].render()).collect();
            seen.insert(composite.join("\u{1f}"))
        })
        .collect();
    if mask.iter().all(|keep| *keep) {
        return Ok(frame.clone());
    }
    Ok(frame.filter(&BooleanChunked::new("mask".into(), mask))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sih_model::{Projection, SemanticType};

    #[test]
    fn required_columns_include_filter_columns() {
        let relation = RelationSchema::new("mortes")
            .column("N_AIH", SemanticType::BigInt)
            .column("CID_MORTE", SemanticType::Code)
            .projected(Projection::filtered(Predicate::equals("MORTE", 1)));
        assert_eq!(
            TableProjector::required_columns(&relation),
            vec!["N_AIH", "CID_MORTE", "MORTE"]
        );
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let frame = DataFrame::new(vec![
            Series::new("K".into(), [1i64, 2, 1]).into_column(),
            Series::new("V".into(), ["a", "b", "c"]).into_column(),
        ])
        .unwrap();
        let out = dedupe(&frame, &["K".to_string()]).unwrap();
        assert_eq!(out.height(), 2);
        let values: Vec<Option<&str>> = out.column("V").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some("a"), Some("b")]);
    }
}
