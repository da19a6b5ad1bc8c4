//! Integration tests for the built-in catalog.

use std::path::Path;

use sih_model::RelationSource;
use sih_standards::{BUSINESS_KEY, INPUT_COLUMNS, SchemaRegistry};

fn position(order: &[&str], name: &str) -> usize {
    order.iter().position(|n| *n == name).unwrap()
}

#[test]
fn standard_catalog_orders_dimensions_before_facts() {
    let registry = SchemaRegistry::standard().unwrap();
    let order = registry.dependency_order();
    let fact = position(&order, "internacoes");
    for dimension in ["hospital", "municipios", "cid10", "procedimentos"] {
        assert!(position(&order, dimension) < fact, "{dimension} after fact");
    }
    for relation in registry.relations() {
        for table in relation.referenced_tables() {
            assert!(position(&order, table) < position(&order, &relation.name));
        }
    }
}

#[test]
fn projected_relations_read_existing_input_columns() {
    let registry = SchemaRegistry::standard().unwrap();
    for relation in registry.projected() {
        let RelationSource::Projected(projection) = &relation.source else {
            unreachable!();
        };
        if let Some(filter) = &projection.filter {
            for column in filter.columns() {
                assert!(INPUT_COLUMNS.contains(&column), "{column} not an input field");
            }
        }
    }
}

#[test]
fn detail_relations_key_on_business_key() {
    let registry = SchemaRegistry::standard().unwrap();
    let detail = registry.get("uti_detalhes").unwrap();
    assert_eq!(detail.primary_key, vec![BUSINESS_KEY.to_string()]);
    assert_eq!(detail.referenced_tables(), vec!["internacoes"]);
    let contraceptivos = registry.get("contraceptivos").unwrap();
    assert_eq!(contraceptivos.primary_key.len(), 2);
}

#[test]
fn registry_loads_from_toml() {
    let text = r#"
        [[relations]]
        name = "cid10"
        primary_key = ["CID"]
        source = { kind = "reference" }
        columns = [
            { name = "CID", semantic = "code" },
            { name = "CD_DESCRICAO", semantic = "text" },
        ]

        [[relations]]
        name = "mortes"
        primary_key = ["N_AIH"]
        columns = [
            { name = "N_AIH", semantic = "big_int" },
            { name = "CID_MORTE", semantic = "code" },
        ]
        foreign_keys = [
            { column = "CID_MORTE", references_table = "cid10", references_column = "CID" },
        ]
        [relations.source]
        kind = "projected"
        shape = { kind = "plain" }
        filter = { op = "equals", column = "MORTE", value = 1 }
    "#;
    let registry = SchemaRegistry::from_toml_str(text, Path::new("registry.toml")).unwrap();
    assert_eq!(registry.dependency_order(), vec!["cid10", "mortes"]);
    assert_eq!(registry.projected().count(), 1);
}

#[test]
fn registry_file_errors_carry_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");
    let error = SchemaRegistry::from_toml_file(&path).unwrap_err();
    assert!(error.to_string().contains("missing.toml"));
}
