//! Table, JSON, and key-schema rendering.
//!
//! Rendered text is the only thing that reaches stdout; diagnostics stay on
//! stderr. Table cells merge every path backing a column, deduplicate, and
//! truncate long values for readability.

use serde_json::Value;

use awsquery_core::{path_union, ColumnPlan, Record};

const CELL_TRUNCATE_AT: usize = 50;

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() > CELL_TRUNCATE_AT {
        let kept: String = text.chars().take(CELL_TRUNCATE_AT - 3).collect();
        format!("{kept}...")
    } else {
        text
    }
}

/// One cell: values of every backing path present in the record, non-empty,
/// deduplicated and sorted when several paths contribute.
fn cell_value(record: &Record, paths: &[String]) -> String {
    let mut values: Vec<String> = paths
        .iter()
        .filter_map(|path| record.get(path))
        .filter(|value| !value.is_null())
        .map(|value| truncate(scalar_text(value)))
        .filter(|text| !text.is_empty())
        .collect();
    values.sort();
    values.dedup();
    values.join(", ")
}

/// Renders records as an aligned text table.
pub fn render_table(records: &[Record], plan: &ColumnPlan) -> String {
    if records.is_empty() {
        return "No results found.".to_string();
    }
    if plan.is_empty() {
        return "No matching columns found.".to_string();
    }

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| plan.paths.iter().map(|paths| cell_value(record, paths)).collect())
        .filter(|row: &Vec<String>| row.iter().any(|cell| !cell.trim().is_empty()))
        .collect();
    if rows.is_empty() {
        return "No results found.".to_string();
    }

    let mut widths: Vec<usize> = plan.headers.iter().map(String::len).collect();
    for row in &rows {
        for (index, cell) in row.iter().enumerate() {
            widths[index] = widths[index].max(cell.len());
        }
    }

    let format_row = |cells: &[String]| -> String {
        let mut line = String::new();
        for (index, cell) in cells.iter().enumerate() {
            if index > 0 {
                line.push_str("  ");
            }
            if index + 1 == cells.len() {
                line.push_str(cell);
            } else {
                line.push_str(&format!("{cell:<width$}", width = widths[index]));
            }
        }
        line.trim_end().to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(&plan.headers));
    let underline: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    lines.push(format_row(&underline));
    for row in &rows {
        lines.push(format_row(row));
    }
    lines.join("\n")
}

/// Renders records as a JSON array, projected to the plan's columns when one
/// is given.
pub fn render_json(records: &[Record], plan: Option<&ColumnPlan>) -> String {
    let payload = match plan {
        None => serde_json::to_value(records).unwrap_or(Value::Null),
        Some(plan) => {
            let projected: Vec<Value> = records
                .iter()
                .filter_map(|record| {
                    let mut object = serde_json::Map::new();
                    for (header, paths) in plan.headers.iter().zip(&plan.paths) {
                        let cell = cell_value(record, paths);
                        if !cell.is_empty() {
                            object.insert(header.clone(), Value::String(cell));
                        }
                    }
                    if object.is_empty() {
                        None
                    } else {
                        Some(Value::Object(object))
                    }
                })
                .collect();
            Value::Array(projected)
        }
    };
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "[]".to_string())
}

/// Renders the sorted union of dotted paths, one per line.
pub fn render_keys(records: &[Record]) -> String {
    let mut paths: Vec<String> = path_union(records).into_iter().collect();
    paths.sort_by_key(|path| path.to_ascii_lowercase());
    paths
        .iter()
        .map(|path| format!("  {path}"))
        .collect::<Vec<_>>()
        .join("\n")
}
