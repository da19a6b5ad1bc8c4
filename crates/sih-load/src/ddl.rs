//! SQL generation for the PostgreSQL target.
//!
//! Identifiers are always double-quoted so mixed-case source column names
//! (`N_AIH`, `codigo_6d`) survive unchanged.

use sih_model::{CopyOptions, ForeignKey, RelationSchema, SemanticType};
use sih_standards::SchemaRegistry;

/// Store-native column type of a semantic type.
pub fn sql_type(semantic: SemanticType) -> &'static str {
    match semantic {
        SemanticType::SmallInt => "SMALLINT",
        SemanticType::Integer => "INTEGER",
        SemanticType::BigInt => "BIGINT",
        SemanticType::Decimal => "DOUBLE PRECISION",
        SemanticType::Text | SemanticType::Code => "TEXT",
        SemanticType::Date => "DATE",
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn create_table_sql(relation: &RelationSchema) -> String {
    let mut lines: Vec<String> = relation
        .columns
        .iter()
        .map(|column| {
            let not_null = if relation.primary_key.contains(&column.name) {
                " NOT NULL"
            } else {
                ""
            };
            format!(
                "    {} {}{not_null}",
                quote_ident(&column.name),
                sql_type(column.semantic)
            )
        })
        .collect();
    if !relation.primary_key.is_empty() {
        lines.push(format!("    PRIMARY KEY ({})", quote_list(&relation.primary_key)));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(&relation.name),
        lines.join(",\n")
    )
}

pub fn truncate_sql(table: &str) -> String {
    format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE;", quote_ident(table))
}

pub fn unique_constraint_name(table: &str, columns: &[String]) -> String {
    format!("uq_{}_{}", table, columns.join("_")).to_lowercase()
}

pub fn foreign_key_name(table: &str, fk: &ForeignKey) -> String {
    format!("fk_{}_{}", table, fk.column).to_lowercase()
}

pub fn add_unique_sql(table: &str, name: &str, columns: &[String]) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
        quote_ident(table),
        quote_ident(name),
        quote_list(columns)
    )
}

pub fn add_foreign_key_sql(table: &str, name: &str, fk: &ForeignKey) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({});",
        quote_ident(table),
        quote_ident(name),
        quote_ident(&fk.column),
        quote_ident(&fk.references_table),
        quote_ident(&fk.references_column)
    )
}

pub fn copy_sql(table: &str, columns: &[String], options: &CopyOptions) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, DELIMITER {}, NULL {})",
        quote_ident(table),
        quote_list(columns),
        quote_literal(&options.delimiter.to_string()),
        quote_literal(&options.null)
    )
}

/// Full DDL script for a registry: tables in dependency order, then unique
/// constraints, then foreign keys.
pub fn schema_script(registry: &SchemaRegistry) -> String {
    let mut statements: Vec<String> = registry.ordered().map(create_table_sql).collect();
    for relation in registry.ordered() {
        for unique in &relation.uniques {
            let name = unique_constraint_name(&relation.name, unique);
            statements.push(add_unique_sql(&relation.name, &name, unique));
        }
    }
    for relation in registry.ordered() {
        for fk in &relation.foreign_keys {
            let name = foreign_key_name(&relation.name, fk);
            statements.push(add_foreign_key_sql(&relation.name, &name, fk));
        }
    }
    statements.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    fn municipios() -> RelationSchema {
        RelationSchema::new("municipios")
            .column("codigo_6d", SemanticType::Code)
            .column("codigo_ibge", SemanticType::Code)
            .column("latitude", SemanticType::Decimal)
            .primary_key(["codigo_6d"])
            .unique(["codigo_ibge"])
    }

    #[test]
    fn create_table_marks_key_columns_not_null() {
        assert_snapshot!(create_table_sql(&municipios()), @r#"
        CREATE TABLE IF NOT EXISTS "municipios" (
            "codigo_6d" TEXT NOT NULL,
            "codigo_ibge" TEXT,
            "latitude" DOUBLE PRECISION,
            PRIMARY KEY ("codigo_6d")
        );
        "#);
    }

    #[test]
    fn constraint_statements() {
        let fk = ForeignKey {
            column: "MUNIC_RES".to_string(),
            references_table: "municipios".to_string(),
            references_column: "codigo_6d".to_string(),
        };
        let name = foreign_key_name("internacoes", &fk);
        assert_eq!(name, "fk_internacoes_munic_res");
        assert_snapshot!(
            add_foreign_key_sql("internacoes", &name, &fk),
            @r#"ALTER TABLE "internacoes" ADD CONSTRAINT "fk_internacoes_munic_res" FOREIGN KEY ("MUNIC_RES") REFERENCES "municipios" ("codigo_6d");"#
        );
        let unique = vec!["codigo_ibge".to_string()];
        assert_eq!(
            add_unique_sql("municipios", &unique_constraint_name("municipios", &unique), &unique),
            r#"ALTER TABLE "municipios" ADD CONSTRAINT "uq_municipios_codigo_ibge" UNIQUE ("codigo_ibge");"#
        );
    }

    #[test]
    fn copy_statement_uses_configured_delimiter_and_null() {
        let options = CopyOptions::default().with_delimiter(';').with_null("\\N");
        assert_eq!(
            copy_sql("cid10", &["CID".to_string(), "CD_DESCRICAO".to_string()], &options),
            r#"COPY "cid10" ("CID", "CD_DESCRICAO") FROM STDIN WITH (FORMAT csv, DELIMITER ';', NULL '\N')"#
        );
        assert_eq!(truncate_sql("cid10"), r#"TRUNCATE TABLE "cid10" RESTART IDENTITY CASCADE;"#);
    }

    #[test]
    fn quotes_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn schema_script_orders_tables_before_constraints() {
        let script = schema_script(&SchemaRegistry::standard().unwrap());
        let fact = script.find("CREATE TABLE IF NOT EXISTS \"internacoes\"").unwrap();
        let dimension = script.find("CREATE TABLE IF NOT EXISTS \"hospital\"").unwrap();
        let first_fk = script.find("FOREIGN KEY").unwrap();
        let last_create = script.rfind("CREATE TABLE").unwrap();
        assert!(dimension < fact);
        assert!(last_create < first_fk);
    }
}
