use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use sih_model::RelationSchema;

use crate::catalog::standard_relations;
use crate::error::SchemaError;

/// Immutable lookup of relation schemas with a precomputed dependency order.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    relations: Vec<RelationSchema>,
    order: Vec<usize>,
}

#[derive(Deserialize)]
struct RegistryFile {
    relations: Vec<RelationSchema>,
}

impl SchemaRegistry {
    /// Validates the declarations and computes the dependency order.
    pub fn new(relations: Vec<RelationSchema>) -> Result<Self, SchemaError> {
        validate(&relations)?;
        let order = dependency_order(&relations)?;
        Ok(Self { relations, order })
    }

    /// The built-in AIH catalog.
    pub fn standard() -> Result<Self, SchemaError> {
        Self::new(standard_relations())
    }

    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, SchemaError> {
        let file: RegistryFile = toml::from_str(text).map_err(|source| SchemaError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(file.relations)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    pub fn get(&self, name: &str) -> Option<&RelationSchema> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Relations in declaration order.
    pub fn relations(&self) -> &[RelationSchema] {
        &self.relations
    }

    /// Relations with every referenced relation placed before its referrers.
    pub fn ordered(&self) -> impl Iterator<Item = &RelationSchema> {
        self.order.iter().map(|&idx| &self.relations[idx])
    }

    pub fn dependency_order(&self) -> Vec<&str> {
        self.ordered().map(|r| r.name.as_str()).collect()
    }

    /// Relations derived from the aggregated record set, in dependency order.
    pub fn projected(&self) -> impl Iterator<Item = &RelationSchema> {
        self.ordered().filter(|r| !r.is_reference())
    }
}

fn validate(relations: &[RelationSchema]) -> Result<(), SchemaError> {
    let mut names = BTreeSet::new();
    for relation in relations {
        if !names.insert(relation.name.as_str()) {
            return Err(SchemaError::DuplicateRelation {
                name: relation.name.clone(),
            });
        }
    }
    for relation in relations {
        if relation.primary_key.is_empty() {
            return Err(SchemaError::MissingPrimaryKey {
                relation: relation.name.clone(),
            });
        }
        let constrained = relation
            .primary_key
            .iter()
            .chain(relation.foreign_keys.iter().map(|fk| &fk.column))
            .chain(relation.uniques.iter().flatten());
        for column in constrained {
            if relation.column_def(column).is_none() {
                return Err(SchemaError::UnknownColumn {
                    relation: relation.name.clone(),
                    column: column.clone(),
                });
            }
        }
        for fk in &relation.foreign_keys {
            let Some(target) = relations.iter().find(|r| r.name == fk.references_table) else {
                return Err(SchemaError::UnknownReference {
                    relation: relation.name.clone(),
                    table: fk.references_table.clone(),
                });
            };
            if target.column_def(&fk.references_column).is_none() {
                return Err(SchemaError::UnknownColumn {
                    relation: target.name.clone(),
                    column: fk.references_column.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm; among ready relations the earliest declared goes first.
fn dependency_order(relations: &[RelationSchema]) -> Result<Vec<usize>, SchemaError> {
    let mut placed = vec![false; relations.len()];
    let mut order = Vec::with_capacity(relations.len());
    while order.len() < relations.len() {
        let ready = relations.iter().enumerate().find(|(idx, relation)| {
            !placed[*idx]
                && relation.referenced_tables().iter().all(|table| {
                    relations
                        .iter()
                        .position(|r| r.name == *table)
                        .is_some_and(|pos| placed[pos])
                })
        });
        match ready {
            Some((idx, _)) => {
                placed[idx] = true;
                order.push(idx);
            }
            None => {
                let remaining = relations
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| !placed[*idx])
                    .map(|(_, r)| r.name.clone())
                    .collect();
                return Err(SchemaError::Cycle {
                    relations: remaining,
                });
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sih_model::SemanticType;

    fn relation(name: &str) -> RelationSchema {
        RelationSchema::new(name)
            .column("id", SemanticType::BigInt)
            .column("ref", SemanticType::BigInt)
            .primary_key(["id"])
    }

    #[test]
    fn referenced_relations_come_first() {
        let registry = SchemaRegistry::new(vec![
            relation("child").foreign_key("ref", "parent", "id"),
            relation("parent"),
        ])
        .unwrap();
        assert_eq!(registry.dependency_order(), vec!["parent", "child"]);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let registry =
            SchemaRegistry::new(vec![relation("b"), relation("a"), relation("c")]).unwrap();
        assert_eq!(registry.dependency_order(), vec!["b", "a", "c"]);
    }

    #[test]
    fn self_reference_is_not_a_cycle() {
        let registry =
            SchemaRegistry::new(vec![relation("tree").foreign_key("ref", "tree", "id")]).unwrap();
        assert_eq!(registry.dependency_order(), vec!["tree"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let error = SchemaRegistry::new(vec![
            relation("a").foreign_key("ref", "b", "id"),
            relation("b").foreign_key("ref", "a", "id"),
        ])
        .unwrap_err();
        assert!(matches!(error, SchemaError::Cycle { relations } if relations.len() == 2));
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let error =
            SchemaRegistry::new(vec![relation("a").foreign_key("ref", "missing", "id")])
                .unwrap_err();
        assert!(matches!(error, SchemaError::UnknownReference { .. }));
    }

    #[test]
    fn constraint_on_undeclared_column_is_rejected() {
        let error = SchemaRegistry::new(vec![relation("a").unique(["nope"])]).unwrap_err();
        assert!(matches!(error, SchemaError::UnknownColumn { column, .. } if column == "nope"));
    }
}
