use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML registry {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("duplicate relation: {name}")]
    DuplicateRelation { name: String },

    #[error("relation {relation} references unknown relation {table}")]
    UnknownReference { relation: String, table: String },

    #[error("relation {relation} declares constraint on undeclared column {column}")]
    UnknownColumn { relation: String, column: String },

    #[error("relation {relation} has no primary key")]
    MissingPrimaryKey { relation: String },

    #[error("foreign keys form a cycle through: {}", relations.join(", "))]
    Cycle { relations: Vec<String> },
}
