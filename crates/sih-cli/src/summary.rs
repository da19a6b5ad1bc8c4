use std::time::Duration;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use sih_core::{AggregateReport, ProjectionOutcome, RelationResult};
use sih_load::{ConstraintKind, ConstraintOutcome, LoadReport, RelationOutcome};

use sih_cli::pipeline::{AggregateStageReport, NormalizeReport, ProjectReport, RunReport};

pub fn print_normalize(report: &NormalizeReport) {
    println!("Output: {}", report.output.display());
    let mut table = Table::new();
    table.set_header(vec![header_cell("Stage"), header_cell("Rows")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table.add_row(vec![Cell::new("Files read"), Cell::new(report.files_read)]);
    table.add_row(vec![Cell::new("Rows read"), Cell::new(report.rows_read)]);
    table.add_row(vec![
        Cell::new("Dropped (no key)"),
        count_cell(report.dropped_keys, Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("Rows written")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(report.rows_written).add_attribute(Attribute::Bold),
    ]);
    println!("{table}");
    print_fallbacks(&report.fallbacks);
    print_skipped_files(&report.skipped_files);
}

pub fn print_aggregate(stage: &AggregateStageReport) {
    println!("Output: {}", stage.output.display());
    print_aggregate_table(&stage.report);
    print_fallbacks(&stage.report.fallbacks);
    print_skipped_files(&stage.report.skipped_files);
}

fn print_aggregate_table(report: &AggregateReport) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Strategy"),
        header_cell("Files"),
        header_cell("Rows read"),
        header_cell("Normalized"),
        header_cell("No key"),
        header_cell("Chunks"),
        header_cell("Rounds"),
        header_cell("Admissions"),
    ]);
    apply_table_style(&mut table);
    for index in 1..8 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    table.add_row(vec![
        Cell::new(report.strategy)
            .fg(Color::Blue)
            .add_attribute(Attribute::Bold),
        Cell::new(report.files_read),
        Cell::new(report.rows_read),
        Cell::new(report.rows_normalized),
        count_cell(report.dropped_keys, Color::Yellow),
        Cell::new(report.chunks),
        dim_or_value(report.merge_rounds),
        Cell::new(report.output_rows).add_attribute(Attribute::Bold),
    ]);
    println!("{table}");
}

pub fn print_projection(report: &ProjectReport) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Relation"),
        header_cell("Status"),
        header_cell("Rows"),
        header_cell("Artifact"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    align_column(&mut table, 2, CellAlignment::Right);
    let mut total = 0usize;
    for result in &report.relations {
        if let ProjectionOutcome::Written { rows } = result.outcome {
            total += rows;
        }
        table.add_row(projection_row(result));
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(total).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    println!("{table}");
    for result in &report.relations {
        match &result.outcome {
            ProjectionOutcome::Skipped { reason } => {
                eprintln!("- {} skipped: {reason}", result.relation);
            }
            ProjectionOutcome::Failed { error } => {
                eprintln!("- {} failed: {error}", result.relation);
            }
            ProjectionOutcome::Written { .. } => {}
        }
    }
}

fn projection_row(result: &RelationResult) -> Vec<Cell> {
    let relation = Cell::new(&result.relation)
        .fg(Color::Blue)
        .add_attribute(Attribute::Bold);
    match &result.outcome {
        ProjectionOutcome::Written { rows } => vec![
            relation,
            Cell::new("✓").fg(Color::Green).add_attribute(Attribute::Bold),
            Cell::new(rows),
            Cell::new(result.path.display()),
        ],
        ProjectionOutcome::Skipped { .. } => vec![
            relation,
            Cell::new("SKIP").fg(Color::Yellow),
            dim_cell("-"),
            dim_cell("-"),
        ],
        ProjectionOutcome::Failed { .. } => vec![
            relation,
            Cell::new("FAIL").fg(Color::Red).add_attribute(Attribute::Bold),
            dim_cell("-"),
            dim_cell("-"),
        ],
    }
}

pub fn print_load(report: &LoadReport) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Relation"),
        header_cell("Status"),
        header_cell("Rows"),
        header_cell("Chunks"),
        header_cell("Coerced"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    for index in 2..5 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    for load in &report.relations {
        let relation = Cell::new(&load.relation)
            .fg(Color::Blue)
            .add_attribute(Attribute::Bold);
        match &load.outcome {
            RelationOutcome::Loaded {
                rows,
                chunks,
                coerced,
            } => table.add_row(vec![
                relation,
                Cell::new("✓").fg(Color::Green).add_attribute(Attribute::Bold),
                Cell::new(rows),
                Cell::new(chunks),
                count_cell(*coerced, Color::Yellow),
            ]),
            RelationOutcome::Skipped { .. } => table.add_row(vec![
                relation,
                Cell::new("SKIP").fg(Color::Yellow),
                dim_cell("-"),
                dim_cell("-"),
                dim_cell("-"),
            ]),
        };
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(report.rows_loaded()).add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
    ]);
    println!("{table}");
    print_constraints(report);
}

fn print_constraints(report: &LoadReport) {
    if report.constraints.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Constraint"),
        header_cell("Table"),
        header_cell("Kind"),
        header_cell("Status"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Center);
    for constraint in &report.constraints {
        let kind = match constraint.kind {
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
        };
        let status = match &constraint.outcome {
            ConstraintOutcome::Added => Cell::new("added").fg(Color::Green),
            ConstraintOutcome::AlreadyPresent => dim_cell("present"),
            ConstraintOutcome::Failed { .. } => Cell::new("FAIL").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&constraint.name),
            Cell::new(&constraint.table),
            Cell::new(kind),
            status,
        ]);
    }
    println!();
    println!("Constraints:");
    println!("{table}");
    let failures: Vec<_> = report.failed_constraints().collect();
    if !failures.is_empty() {
        eprintln!("Constraint failures:");
        for failure in failures {
            if let ConstraintOutcome::Failed { error } = &failure.outcome {
                eprintln!("- {}: {error}", failure.name);
            }
        }
    }
}

pub fn print_run(report: &RunReport) {
    print_aggregate(&report.aggregate);
    println!();
    print_projection(&report.project);
    println!();
    print_load(&report.load);
    println!();
    println!("Elapsed: {}", format_elapsed(report.elapsed));
}

fn print_fallbacks(fallbacks: &std::collections::BTreeMap<String, usize>) {
    if fallbacks.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![header_cell("Column"), header_cell("Fallbacks")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for (column, count) in fallbacks {
        table.add_row(vec![Cell::new(column), count_cell(*count, Color::Yellow)]);
    }
    println!();
    println!("Coercion fallbacks:");
    println!("{table}");
}

fn print_skipped_files(files: &[std::path::PathBuf]) {
    if files.is_empty() {
        return;
    }
    eprintln!("Unreadable input files:");
    for file in files {
        eprintln!("- {}", file.display());
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (minutes, seconds) = (total / 60, total % 60);
    if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn dim_or_value(value: usize) -> Cell {
    if value == 0 {
        dim_cell("-")
    } else {
        Cell::new(value)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_under_a_minute_shows_fraction() {
        assert_eq!(format_elapsed(Duration::from_millis(2500)), "2.50s");
    }

    #[test]
    fn elapsed_over_a_minute_shows_minutes() {
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 05s");
    }
}
