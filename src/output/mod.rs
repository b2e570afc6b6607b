use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde_json::{Map, Value};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::records::Record;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Text,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".csv") {
        return Some(OutputFormat::Csv);
    }
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

/// `records-YYYY-MM-DD-HH-MM-SS.<ext>` for the given instant.
pub fn export_filename(now: DateTime<Utc>, format: OutputFormat) -> String {
    format!(
        "records-{}.{}",
        now.format("%Y-%m-%d-%H-%M-%S"),
        format.extension()
    )
}

pub fn escape_csv(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Header line of field names, then one line per record; every cell quoted,
/// lines joined with CRLF.
pub fn render_csv<'a>(fields: &[String], records: impl IntoIterator<Item = &'a Record>) -> String {
    let header = fields.iter().map(|f| escape_csv(f)).join(",");
    let rows = records
        .into_iter()
        .map(|r| fields.iter().map(|f| escape_csv(&r.field_value(f))).join(","));
    std::iter::once(header).chain(rows).join("\r\n")
}

/// One object per record holding the catalog fields; missing values are null.
pub fn render_json<'a>(fields: &[String], records: impl IntoIterator<Item = &'a Record>) -> Vec<u8> {
    let rows: Vec<Map<String, Value>> = records
        .into_iter()
        .map(|r| {
            fields
                .iter()
                .map(|f| (f.clone(), r.get(f).cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .collect();
    serde_json::to_vec_pretty(&rows).unwrap_or_else(|_| b"[]\n".to_vec())
}

const MAX_CELL_WIDTH: usize = 32;

fn clip(value: &str) -> String {
    let flat = value.replace(['\r', '\n', '\t'], " ");
    if flat.chars().count() <= MAX_CELL_WIDTH {
        flat
    } else {
        let mut out: String = flat.chars().take(MAX_CELL_WIDTH - 1).collect();
        out.push('\u{2026}');
        out
    }
}

/// Fixed-width table for the terminal. Cells are flattened to one line and
/// clipped.
pub fn render_text<'a>(fields: &[String], records: impl IntoIterator<Item = &'a Record>) -> String {
    let rows: Vec<Vec<String>> = records
        .into_iter()
        .map(|r| fields.iter().map(|f| clip(&r.field_value(f))).collect())
        .collect();
    let headers: Vec<String> = fields.iter().map(|f| clip(f)).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows.iter() {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers.as_slice()));
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).join("-+-"));
    out.push('\n');
    for row in rows.iter() {
        out.push_str(&line(row.as_slice()));
        out.push('\n');
    }
    out
}

pub fn render<'a>(
    format: OutputFormat,
    fields: &[String],
    records: impl IntoIterator<Item = &'a Record>,
) -> Vec<u8> {
    match format {
        OutputFormat::Csv => render_csv(fields, records).into_bytes(),
        OutputFormat::Json => render_json(fields, records),
        OutputFormat::Text => render_text(fields, records).into_bytes(),
    }
}

pub async fn write_file(path: &str, rendered: &[u8]) -> Result<(), String> {
    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| format!("failed to open output file '{path}': {e}"))?;
    outfile
        .write_all(rendered)
        .await
        .map_err(|e| format!("failed to write output file '{path}': {e}"))?;
    Ok(())
}
