//! Output formatters for query results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use histdb_proto::{QueryResponse, Value};

use crate::ingest::IngestStats;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format one page of query results.
    fn format_response(&self, response: &QueryResponse) -> String;

    /// Format the outcome of an ingest run.
    fn format_ingest(&self, stats: &IngestStats, head_block: u64) -> String;

    /// Format the head block.
    fn format_head(&self, head_block: u64) -> String;

    /// Format the list of registered queries.
    fn format_queries(&self, names: &[&str]) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_response(&self, response: &QueryResponse) -> String {
        let mut table = Table::new();

        let mut headers: Vec<Cell> = vec![Cell::new("block_index"), Cell::new("present")];
        headers.extend(response.columns.iter().map(Cell::new));
        table.set_header(headers);

        for row in &response.rows {
            let mut cells = vec![Cell::new(row.block_index), Cell::new(row.present)];
            cells.extend(row.values.iter().map(|v| Cell::new(format_value(v))));
            table.add_row(cells);
        }

        let mut output = format!("{}\n{} row(s)", table, response.len());
        if let Some(more) = &response.more {
            output.push_str(&format!("\nmore: {}", token_json(more)));
        }
        output
    }

    fn format_ingest(&self, stats: &IngestStats, head_block: u64) -> String {
        format!(
            "{} line(s): {} appended, {} unchanged; head block {}",
            stats.lines, stats.appended, stats.unchanged, head_block
        )
    }

    fn format_head(&self, head_block: u64) -> String {
        format!("head block {}", head_block)
    }

    fn format_queries(&self, names: &[&str]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Query"]);
        for name in names {
            table.add_row(vec![*name]);
        }
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_response(&self, response: &QueryResponse) -> String {
        let rows: Vec<serde_json::Value> = response
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                obj.insert("block_index".to_string(), row.block_index.into());
                obj.insert("present".to_string(), row.present.into());
                for (column, value) in response.columns.iter().zip(&row.values) {
                    obj.insert(column.clone(), value.to_json());
                }
                serde_json::Value::Object(obj)
            })
            .collect();

        let more = match &response.more {
            Some(token) => serde_json::Value::Array(token.iter().map(Value::to_json).collect()),
            None => serde_json::Value::Null,
        };

        serde_json::json!({ "rows": rows, "more": more }).to_string()
    }

    fn format_ingest(&self, stats: &IngestStats, head_block: u64) -> String {
        serde_json::json!({
            "lines": stats.lines,
            "appended": stats.appended,
            "unchanged": stats.unchanged,
            "head_block": head_block
        })
        .to_string()
    }

    fn format_head(&self, head_block: u64) -> String {
        serde_json::json!({ "head_block": head_block }).to_string()
    }

    fn format_queries(&self, names: &[&str]) -> String {
        serde_json::json!(names).to_string()
    }
}

/// Format a value for a table cell.
fn format_value(value: &Value) -> String {
    match value {
        Value::Bytes(b) if b.len() > 32 => format!("{}.. ({} bytes)", hex_prefix(b), b.len()),
        _ => value.to_string(),
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// A continuation token as the JSON array `--first` accepts.
fn token_json(token: &[Value]) -> String {
    serde_json::Value::Array(token.iter().map(Value::to_json).collect()).to_string()
}
