use anyhow::Result;
use comfy_table::Table;
use sih_load::ddl::schema_script;
use sih_model::RelationSource;

use sih_cli::config::PipelineConfig;
use sih_cli::pipeline::registry;

use crate::summary::apply_table_style;

/// Prints the relations in dependency order followed by their DDL.
pub fn run_schema(config: &PipelineConfig) -> Result<()> {
    let registry = registry(config)?;
    let mut table = Table::new();
    table.set_header(vec!["Relation", "Source", "Primary key", "Depends on"]);
    apply_table_style(&mut table);
    for relation in registry.ordered() {
        let source = match &relation.source {
            RelationSource::Projected(_) => "projected",
            RelationSource::Reference => "reference",
        };
        let depends = relation.referenced_tables();
        table.add_row(vec![
            relation.name.clone(),
            source.to_string(),
            relation.primary_key.join(", "),
            if depends.is_empty() {
                "-".to_string()
            } else {
                depends.join(", ")
            },
        ]);
    }
    println!("{table}");
    println!();
    println!("{}", schema_script(&registry));
    Ok(())
}
