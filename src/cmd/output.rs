//! Rendering command results for stdout

use crate::config::OutputMode;
use crate::error::{M365Error, Result};
use serde_json::Value;

/// Render `value` in `mode`; `None` means nothing should be printed
pub fn render(value: &Value, mode: OutputMode) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }

    match mode {
        OutputMode::None => Ok(None),
        OutputMode::Json => Ok(Some(serde_json::to_string_pretty(value)?)),
        OutputMode::Text => Ok(render_text(value)),
        OutputMode::Csv => render_csv(value).map(Some),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

fn render_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) if items.iter().all(Value::is_object) => Some(render_table(items)),
        Value::Array(items) => Some(items.iter().map(scalar).collect::<Vec<_>>().join("\n")),
        Value::Object(map) => {
            let width = map.keys().map(|k| k.chars().count()).max().unwrap_or(0);
            let lines: Vec<String> = map
                .iter()
                .map(|(key, v)| format!("{:<width$}: {}", key, scalar(v), width = width))
                .collect();
            Some(lines.join("\n"))
        }
        _ => Some(scalar(value)),
    }
}

fn columns(items: &[Value]) -> Vec<String> {
    items
        .first()
        .and_then(Value::as_object)
        .map(|first| first.keys().cloned().collect())
        .unwrap_or_default()
}

fn render_table(items: &[Value]) -> String {
    let columns = columns(items);
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| columns.iter().map(|c| scalar(&item[c])).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![
        format_row(columns.as_slice()),
        format_row(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().as_slice()),
    ];
    lines.extend(rows.iter().map(|r| format_row(r.as_slice())));
    lines.join("\n")
}

fn render_csv(value: &Value) -> Result<String> {
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    if items.is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if items.iter().all(Value::is_object) {
        let columns = columns(&items);
        writer.write_record(&columns).map_err(csv_error)?;
        for item in &items {
            let record: Vec<String> = columns.iter().map(|c| scalar(&item[c])).collect();
            writer.write_record(&record).map_err(csv_error)?;
        }
    } else {
        for item in &items {
            writer.write_record([scalar(item)]).map_err(csv_error)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| M365Error::CommandError(format!("Failed to write CSV: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
}

fn csv_error(e: csv::Error) -> M365Error {
    M365Error::CommandError(format!("Failed to write CSV: {}", e))
}
