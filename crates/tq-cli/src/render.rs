//! Text renderings of a [`QueryResult`].

use std::fmt::Write as _;
use std::io::{self, Write};

use testquery::{QueryResult, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format `{other}` (expected table or json)")),
        }
    }
}

pub fn render<W: Write>(result: &QueryResult, format: OutputFormat, out: &mut W) -> io::Result<()> {
    match format {
        OutputFormat::Table => render_table(result, out),
        OutputFormat::Json => render_json(result, out),
    }
}

/// Cell text for the table view. Newlines are escaped so each row stays on
/// one line.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_owned(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(t) => t.replace('\r', "\\r").replace('\n', "\\n"),
        Value::Blob(bytes) => blob_literal(bytes),
    }
}

fn blob_literal(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2 + 3);
    hex.push_str("x'");
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex.push('\'');
    hex
}

/// Bordered table followed by a row count. Statements without a result set
/// print the number of changed rows instead.
pub fn render_table<W: Write>(result: &QueryResult, out: &mut W) -> io::Result<()> {
    if !result.has_columns() {
        return writeln!(out, "{} row(s) affected", result.changes);
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border = border_line(&widths);
    writeln!(out, "{border}")?;
    writeln!(out, "{}", table_line(&result.columns, &widths))?;
    writeln!(out, "{border}")?;
    for row in &cells {
        writeln!(out, "{}", table_line(row, &widths))?;
    }
    writeln!(out, "{border}")?;
    let noun = if cells.len() == 1 { "row" } else { "rows" };
    writeln!(out, "({} {noun})", cells.len())
}

fn border_line(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

fn table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (cell, width) in cells.iter().zip(widths) {
        let pad = width - cell.chars().count();
        let _ = write!(line, " {cell}{} |", " ".repeat(pad));
    }
    line
}

/// Pretty-printed JSON array with one object per row, keys in column order.
pub fn render_json<W: Write>(result: &QueryResult, out: &mut W) -> io::Result<()> {
    let document = if result.has_columns() {
        serde_json::Value::Array(
            result
                .rows
                .iter()
                .map(|row| {
                    let object = result
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().map(json_value))
                        .collect::<serde_json::Map<_, _>>();
                    serde_json::Value::Object(object)
                })
                .collect(),
        )
    } else {
        serde_json::json!({ "changes": result.changes })
    };
    serde_json::to_writer_pretty(&mut *out, &document).map_err(io::Error::other)?;
    writeln!(out)
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(t) => serde_json::Value::String(t.clone()),
        Value::Blob(bytes) => serde_json::Value::String(blob_literal(bytes)),
    }
}
