//! Spreadsheet and JSON readers for bulk contact import.

use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use outreach_core::{ImportTable, OutreachError};
use serde_json::Value;

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Read an import file into a header row plus data rows, picking the reader by extension.
///
/// # Errors
/// Returns [`OutreachError::Validation`] when the extension is unsupported or the file
/// cannot be read or parsed.
pub fn read_import_file(path: &Path) -> Result<ImportTable, OutreachError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        read_spreadsheet(path)
    } else if extension == "json" {
        read_json(path)
    } else {
        Err(OutreachError::Validation(format!(
            "unsupported import file type `{}`; expected one of {}, json",
            path.display(),
            SPREADSHEET_EXTENSIONS.join(", ")
        )))
    }
}

/// First worksheet only. Its first row is the header.
fn read_spreadsheet(path: &Path) -> Result<ImportTable, OutreachError> {
    let mut workbook = open_workbook_auto(path).map_err(|err| {
        OutreachError::Validation(format!("failed to open workbook {}: {err}", path.display()))
    })?;
    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err(OutreachError::Validation(format!(
            "workbook {} has no worksheets",
            path.display()
        )));
    };
    let range = workbook.worksheet_range(&sheet_name).map_err(|err| {
        OutreachError::Validation(format!("failed to read worksheet `{sheet_name}`: {err}"))
    })?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    Ok(ImportTable {
        headers,
        rows: rows.collect(),
    })
}

fn read_json(path: &Path) -> Result<ImportTable, OutreachError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        OutreachError::Validation(format!("failed to read {}: {err}", path.display()))
    })?;
    let value = serde_json::from_str(&raw).map_err(|err| {
        OutreachError::Validation(format!("invalid JSON in {}: {err}", path.display()))
    })?;
    table_from_json_value(value)
}

/// An array of objects keyed by column header. Headers keep first-seen order.
///
/// # Errors
/// Returns [`OutreachError::Validation`] unless `value` is an array of objects.
pub fn table_from_json_value(value: Value) -> Result<ImportTable, OutreachError> {
    let Value::Array(items) = value else {
        return Err(OutreachError::Validation(
            "JSON import MUST be an array of objects".to_string(),
        ));
    };

    let mut objects = Vec::with_capacity(items.len());
    let mut headers: Vec<String> = Vec::new();
    for (offset, item) in items.into_iter().enumerate() {
        let Value::Object(object) = item else {
            return Err(OutreachError::Validation(format!(
                "JSON import row {} is not an object",
                offset + 1
            )));
        };
        for key in object.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        objects.push(object);
    }

    let rows = objects
        .iter()
        .map(|object| {
            headers
                .iter()
                .map(|header| object.get(header).map(json_to_cell).unwrap_or_default())
                .collect()
        })
        .collect();
    Ok(ImportTable { headers, rows })
}

fn json_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => bool_cell(*flag),
        Value::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() => float_cell(float),
            _ => number.to_string(),
        },
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => text.clone(),
        Data::Float(float) => float_cell(*float),
        Data::Int(int) => int.to_string(),
        Data::Bool(flag) => bool_cell(*flag),
        Data::Error(err) => format!("#ERROR: {err:?}"),
        Data::DateTime(datetime) => datetime.to_string(),
    }
}

/// Whole numbers lose the trailing `.0` so phone numbers and ids survive.
fn float_cell(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn bool_cell(value: bool) -> String {
    let label = if value { "TRUE" } else { "FALSE" };
    label.to_string()
}
