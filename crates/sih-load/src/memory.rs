//! In-memory target store.
//!
//! Mirrors the PostgreSQL behavior the loader relies on: tables created once,
//! cascading truncation along foreign keys, primary-key and foreign-key
//! enforcement on insert, and constraint validation against existing rows.
//! Used for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use sih_model::{CopyOptions, ForeignKey, RelationSchema};
use tracing::debug;

use crate::error::StoreError;
use crate::payload::CopyPayload;
use crate::store::TargetStore;

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl MemoryTable {
    fn position(&self, column: &str) -> Result<usize, StoreError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| StoreError::new(format!("column \"{column}\" does not exist")))
    }

    fn key_of(&self, row: &[Option<String>], columns: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        columns
            .iter()
            .map(|c| self.position(c).map(|idx| row[idx].clone()))
            .collect()
    }

    fn values(&self, column: &str) -> Result<HashSet<String>, StoreError> {
        let idx = self.position(column)?;
        Ok(self.rows.iter().filter_map(|row| row[idx].clone()).collect())
    }
}

#[derive(Debug, Clone)]
struct ForeignKeyConstraint {
    table: String,
    fk: ForeignKey,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemoryTable>,
    constraints: BTreeSet<String>,
    foreign_keys: Vec<ForeignKeyConstraint>,
    fail_copy: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert into `table` fail.
    #[must_use]
    pub fn failing_copy(mut self, table: &str) -> Self {
        self.fail_copy.insert(table.to_string());
        self
    }

    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(name)
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map_or(0, |t| t.rows.len())
    }

    pub fn has_constraint(&self, name: &str) -> bool {
        self.constraints.contains(name)
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, StoreError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::new(format!("relation \"{name}\" does not exist")))
    }

    fn existing(&self, name: &str) -> Result<&MemoryTable, StoreError> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::new(format!("relation \"{name}\" does not exist")))
    }

    /// Checks one foreign key of `table` against candidate rows.
    fn check_reference(
        &self,
        constraint: &ForeignKeyConstraint,
        table: &MemoryTable,
        rows: &[Vec<Option<String>>],
    ) -> Result<(), StoreError> {
        let idx = table.position(&constraint.fk.column)?;
        let referenced = self
            .existing(&constraint.fk.references_table)?
            .values(&constraint.fk.references_column)?;
        if let Some(missing) = rows
            .iter()
            .filter_map(|row| row[idx].as_ref())
            .find(|value| !referenced.contains(*value))
        {
            return Err(StoreError::new(format!(
                "key ({})=({missing}) is not present in table \"{}\"",
                constraint.fk.column, constraint.fk.references_table
            )));
        }
        Ok(())
    }

    fn parse_payload(
        &self,
        columns: &[String],
        payload: &CopyPayload,
        options: &CopyOptions,
    ) -> Result<Vec<Vec<Option<String>>>, StoreError> {
        let delimiter = u8::try_from(options.delimiter)
            .map_err(|_| StoreError::new("delimiter must be a single-byte character"))?;
        let text = std::str::from_utf8(&payload.bytes).map_err(|e| StoreError::new(e.to_string()))?;
        let mut rows = Vec::with_capacity(payload.rows);
        for record in copy_records(text, char::from(delimiter))? {
            if record.len() != columns.len() {
                return Err(StoreError::new(format!(
                    "expected {} fields, found {}",
                    columns.len(),
                    record.len()
                )));
            }
            rows.push(
                record
                    .into_iter()
                    .map(|field| (field.quoted || field.text != options.null).then_some(field.text))
                    .collect(),
            );
        }
        Ok(rows)
    }
}

impl TargetStore for MemoryStore {
    async fn create_table(&mut self, relation: &RelationSchema) -> Result<(), StoreError> {
        self.tables
            .entry(relation.name.clone())
            .or_insert_with(|| MemoryTable {
                columns: relation.columns.iter().map(|c| c.name.clone()).collect(),
                primary_key: relation.primary_key.clone(),
                rows: Vec::new(),
            });
        Ok(())
    }

    async fn truncate(&mut self, table: &str) -> Result<(), StoreError> {
        let mut pending = vec![table.to_string()];
        let mut done = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !done.insert(name.clone()) {
                continue;
            }
            self.table_mut(&name)?.rows.clear();
            pending.extend(
                self.foreign_keys
                    .iter()
                    .filter(|c| c.fk.references_table == name)
                    .map(|c| c.table.clone()),
            );
        }
        debug!(table, cascaded = done.len() - 1, "truncated");
        Ok(())
    }

    async fn copy_chunk(
        &mut self,
        table: &str,
        columns: &[String],
        payload: CopyPayload,
        options: &CopyOptions,
    ) -> Result<u64, StoreError> {
        if self.fail_copy.contains(table) {
            return Err(StoreError::new(format!("insert into \"{table}\" rejected")));
        }
        let incoming = self.parse_payload(columns, &payload, options)?;
        let target = self.existing(table)?;

        // Reorder fields into table column order.
        let positions = columns
            .iter()
            .map(|c| target.position(c))
            .collect::<Result<Vec<_>, _>>()?;
        let rows: Vec<Vec<Option<String>>> = incoming
            .into_iter()
            .map(|fields| {
                let mut row = vec![None; target.columns.len()];
                for (value, &idx) in fields.into_iter().zip(&positions) {
                    row[idx] = value;
                }
                row
            })
            .collect();

        let mut keys = HashSet::with_capacity(target.rows.len() + rows.len());
        for row in target.rows.iter().chain(&rows) {
            let key = target.key_of(row, &target.primary_key)?;
            if key.iter().any(Option::is_none) {
                return Err(StoreError::new(format!(
                    "null value in primary key of \"{table}\""
                )));
            }
            if !keys.insert(key) {
                return Err(StoreError::new(format!(
                    "duplicate key value violates primary key of \"{table}\""
                )));
            }
        }
        for constraint in self.foreign_keys.iter().filter(|c| c.table == table) {
            self.check_reference(constraint, target, &rows)?;
        }

        let written = rows.len() as u64;
        self.table_mut(table)?.rows.extend(rows);
        Ok(written)
    }

    async fn constraint_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        Ok(self.constraints.contains(name))
    }

    async fn add_unique(&mut self, table: &str, name: &str, columns: &[String]) -> Result<(), StoreError> {
        if self.constraints.contains(name) {
            return Err(StoreError::new(format!("constraint \"{name}\" already exists")));
        }
        let target = self.existing(table)?;
        let mut seen = HashSet::with_capacity(target.rows.len());
        for row in &target.rows {
            let key = target.key_of(row, columns)?;
            if key.iter().all(Option::is_some) && !seen.insert(key) {
                return Err(StoreError::new(format!(
                    "could not create unique index \"{name}\": duplicate values"
                )));
            }
        }
        self.constraints.insert(name.to_string());
        Ok(())
    }

    async fn add_foreign_key(&mut self, table: &str, name: &str, fk: &ForeignKey) -> Result<(), StoreError> {
        if self.constraints.contains(name) {
            return Err(StoreError::new(format!("constraint \"{name}\" already exists")));
        }
        let constraint = ForeignKeyConstraint {
            table: table.to_string(),
            fk: fk.clone(),
        };
        let target = self.existing(table)?;
        self.check_reference(&constraint, target, &target.rows)?;
        self.constraints.insert(name.to_string());
        self.foreign_keys.push(constraint);
        Ok(())
    }
}

#[derive(Default)]
struct CopyField {
    text: String,
    quoted: bool,
}

/// Splits a CSV COPY payload into records, remembering which fields were
/// quoted. Only an unquoted field can match the null sentinel.
fn copy_records(text: &str, delimiter: char) -> Result<Vec<Vec<CopyField>>, StoreError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = CopyField::default();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.text.push('"');
                }
                '"' => in_quotes = false,
                _ => field.text.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                field.quoted = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter => {
                record.push(std::mem::take(&mut field));
            }
            _ => field.text.push(c),
        }
    }
    if in_quotes {
        return Err(StoreError::new("unterminated CSV quoted field"));
    }
    if field.quoted || !field.text.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
