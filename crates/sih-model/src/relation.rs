//! Relation descriptors.
//!
//! A [`RelationSchema`] declares what the loader creates (typed columns,
//! primary key, foreign keys, unique sets) and where the rows come from:
//! either a projection of the aggregated record set or an externally
//! produced reference artifact.

use serde::{Deserialize, Serialize};

use crate::semantic::SemanticType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub semantic: SemanticType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

/// Row filter applied by the projector before deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Numeric equality (text values are parsed).
    Equals { column: String, value: i64 },
    /// Numeric value strictly greater than zero.
    Positive { column: String },
    /// Value is present and not a sentinel (empty, all-zero, zero).
    NotSentinel { column: String },
    /// Every nested predicate holds.
    All { predicates: Vec<Predicate> },
}

impl Predicate {
    pub fn equals(column: &str, value: i64) -> Self {
        Self::Equals {
            column: column.to_string(),
            value,
        }
    }

    pub fn positive(column: &str) -> Self {
        Self::Positive {
            column: column.to_string(),
        }
    }

    pub fn not_sentinel(column: &str) -> Self {
        Self::NotSentinel {
            column: column.to_string(),
        }
    }

    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::All {
            predicates: predicates.into_iter().collect(),
        }
    }

    /// Source columns the predicate reads, in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Equals { column, .. }
            | Self::Positive { column }
            | Self::NotSentinel { column } => vec![column.as_str()],
            Self::All { predicates } => predicates.iter().flat_map(Self::columns).collect(),
        }
    }
}

/// Output row shape of a projected relation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    /// One output row per source row.
    #[default]
    Plain,
    /// Wide sibling columns become `(key, label, value)` rows; the label is
    /// the source column name. Sentinel values are dropped.
    Unpivot {
        slots: Vec<String>,
        label_column: String,
        value_column: String,
    },
    /// One row per distinct non-sentinel `key`; every other column takes its
    /// most frequent value within the key (ties go to the first seen).
    ModeByKey { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Projection {
    pub filter: Option<Predicate>,
    pub shape: Shape,
}

impl Projection {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn filtered(predicate: Predicate) -> Self {
        Self {
            filter: Some(predicate),
            shape: Shape::Plain,
        }
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationSource {
    /// Derived from the aggregated record set.
    Projected(Projection),
    /// Loaded from an externally produced lookup artifact.
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub uniques: Vec<Vec<String>>,
    pub source: RelationSource,
}

impl RelationSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
            source: RelationSource::Reference,
        }
    }

    #[must_use]
    pub fn column(mut self, name: &str, semantic: SemanticType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            semantic,
        });
        self
    }

    #[must_use]
    pub fn primary_key<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.primary_key = columns.into_iter().map(str::to_string).collect();
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, column: &str, table: &str, referenced: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            references_table: table.to_string(),
            references_column: referenced.to_string(),
        });
        self
    }

    #[must_use]
    pub fn unique<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.uniques
            .push(columns.into_iter().map(str::to_string).collect());
        self
    }

    #[must_use]
    pub fn projected(mut self, projection: Projection) -> Self {
        self.source = RelationSource::Projected(projection);
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn projection(&self) -> Option<&Projection> {
        match &self.source {
            RelationSource::Projected(projection) => Some(projection),
            RelationSource::Reference => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.source, RelationSource::Reference)
    }

    /// Distinct tables this relation references, excluding itself.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for fk in &self.foreign_keys {
            let table = fk.references_table.as_str();
            if table != self.name && !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }
}
