//! Upload parsing: CSV and Excel files into text-typed tables.

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;

use crate::catalog::ColumnMetadata;
use crate::domain::TabularData;
use crate::error::NlqError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Csv,
    Excel,
}

impl UploadFormat {
    pub fn from_filename(filename: &str) -> Result<Self, NlqError> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".csv") {
            Ok(UploadFormat::Csv)
        } else if lower.ends_with(".xls") || lower.ends_with(".xlsx") {
            Ok(UploadFormat::Excel)
        } else {
            Err(NlqError::UnsupportedFormat {
                filename: filename.to_string(),
            })
        }
    }
}

/// Parses an uploaded file. Every column is declared `TEXT`; empty cells
/// become NULL.
pub fn parse_upload(filename: &str, content: &[u8]) -> Result<TabularData, NlqError> {
    match UploadFormat::from_filename(filename)? {
        UploadFormat::Csv => parse_csv(content),
        UploadFormat::Excel => parse_excel(content),
    }
}

fn ingest_err(e: impl std::fmt::Display) -> NlqError {
    NlqError::IngestError {
        message: e.to_string(),
    }
}

fn parse_csv(content: &[u8]) -> Result<TabularData, NlqError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let headers: Vec<String> = reader
        .headers()
        .map_err(ingest_err)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ingest_err("No columns to parse from file"));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(ingest_err)?;
        let cells = record.iter().map(|cell| Some(cell.to_string())).collect();
        // Header is line 1.
        rows.push(fit_row(cells, headers.len(), line + 2)?);
    }

    Ok(TabularData {
        columns: normalize_headers(&headers),
        rows,
    })
}

fn parse_excel(content: &[u8]) -> Result<TabularData, NlqError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content)).map_err(ingest_err)?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ingest_err("Excel file has no worksheets"))?
        .map_err(ingest_err)?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header_row) => header_row.iter().map(|c| c.to_string()).collect(),
        None => return Err(ingest_err("No columns to parse from file")),
    };

    let mut rows = Vec::new();
    for (line, row) in sheet_rows.enumerate() {
        let cells = row.iter().map(excel_cell).collect();
        rows.push(fit_row(cells, headers.len(), line + 2)?);
    }

    Ok(TabularData {
        columns: normalize_headers(&headers),
        rows,
    })
}

/// Spreadsheet cells as text. Dates come out as `YYYY-MM-DD HH:MM:SS`,
/// durations as `HH:MM:SS`; error cells (`#N/A`, ...) become NULL.
fn excel_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::DateTime(dt) if dt.is_duration() => Some(
            dt.as_duration()
                .map(format_duration)
                .unwrap_or_else(|| dt.as_f64().to_string()),
        ),
        Data::DateTime(dt) => Some(
            dt.as_datetime()
                .map(|d| d.format(DATETIME_FORMAT).to_string())
                .unwrap_or_else(|| dt.as_f64().to_string()),
        ),
        Data::DateTimeIso(iso) => Some(format_iso_datetime(iso)),
        Data::DurationIso(iso) => Some(
            cell.as_duration()
                .map(format_duration)
                .unwrap_or_else(|| iso.clone()),
        ),
        other => Some(other.to_string()),
    }
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_iso_datetime(iso: &str) -> String {
    if let Ok(dt) = NaiveDateTime::from_str(iso) {
        return dt.format(DATETIME_FORMAT).to_string();
    }
    if let Ok(date) = NaiveDate::from_str(iso) {
        return date.and_time(NaiveTime::MIN).format(DATETIME_FORMAT).to_string();
    }
    iso.to_string()
}

fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Pads short rows with NULL; rows wider than the header are malformed.
fn fit_row(
    cells: Vec<Option<String>>,
    width: usize,
    line: usize,
) -> Result<Vec<Option<String>>, NlqError> {
    if cells.len() > width {
        return Err(ingest_err(format!(
            "Error tokenizing data. Expected {} fields in line {}, saw {}",
            width,
            line,
            cells.len()
        )));
    }
    let mut row: Vec<Option<String>> = cells
        .into_iter()
        .map(|cell| cell.filter(|v| !v.is_empty()))
        .collect();
    row.resize(width, None);
    Ok(row)
}

/// Blank headers become `Unnamed: <index>`; repeats get `.1`, `.2`, ... suffixes.
fn normalize_headers(headers: &[String]) -> Vec<ColumnMetadata> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::with_capacity(headers.len());

    for (idx, header) in headers.iter().enumerate() {
        let trimmed = header.trim();
        let base = if trimmed.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            trimmed.to_string()
        };

        let mut name = base.clone();
        while let Some(count) = seen.get_mut(&name) {
            *count += 1;
            name = format!("{}.{}", base, count);
        }
        seen.insert(name.clone(), 0);
        // Later bare repeats continue from the last suffix used.
        if name != base {
            if let Some(count) = seen.get_mut(&base) {
                *count = (*count).max(suffix_of(&name, &base));
            }
        }
        columns.push(ColumnMetadata::text(name));
    }
    columns
}

fn suffix_of(name: &str, base: &str) -> usize {
    name.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}
