//! Block-list loading.
//!
//! Block-lists are kept in tables (one row per ID) where one named column
//! holds the IDs as bare hexadecimal text, e.g.
//!
//! ```text
//! IDs,Comment
//! aaaaa,wipers
//! 7df,obd broadcast
//! ```
//!
//! The same layout works in a spreadsheet, read from its first sheet.

use std::path::Path;

use calamine::Reader;

use crate::constants::EFF_MASK;
use crate::errors::LoadError;
use crate::filter::IdFilter;

/// Read the column named `column` from the table at `path` and parse every
/// non-empty cell as a hexadecimal arbitration ID.
///
/// Order and duplicates are preserved. Spreadsheets (`.xlsx`, `.xlsm`,
/// `.xls`, `.ods`) are read from their first sheet. Files ending in `.tsv`
/// or `.tab` are tab separated; anything else is read as CSV.
pub fn load_ids<P: AsRef<Path>>(path: P, column: &str) -> Result<Vec<u32>, LoadError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }

    let ids = match TableKind::of(path) {
        TableKind::Workbook => read_workbook(path, column)?,
        TableKind::Delimited(delimiter) => read_delimited(path, delimiter, column)?,
    };

    log::debug!("loaded {} IDs from column '{}' of {}", ids.len(), column, path.display());
    Ok(ids)
}

fn read_delimited(path: &Path, delimiter: u8, column: &str) -> Result<Vec<u32>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let index = column_index(reader.headers()?.iter(), column)?;

    let mut ids = Vec::new();
    for (n, record) in reader.records().enumerate() {
        let record = record?;
        push_cell(&mut ids, n + 1, record.get(index).unwrap_or(""))?;
    }
    Ok(ids)
}

fn read_workbook(path: &Path, column: &str) -> Result<Vec<u32>, LoadError> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    let sheet = workbook
        .worksheet_range_at(0)
        .ok_or(LoadError::Workbook(calamine::Error::Msg("workbook has no sheets")))??;

    let mut rows = sheet.rows();
    let header = rows.next().ok_or_else(|| LoadError::MissingColumn(column.to_owned()))?;
    let header: Vec<String> = header.iter().map(|cell| cell.to_string()).collect();
    let index = column_index(header.iter().map(|h| h.trim()), column)?;

    let mut ids = Vec::new();
    for (n, row) in rows.enumerate() {
        let cell = row.get(index).map(|cell| cell.to_string()).unwrap_or_default();
        push_cell(&mut ids, n + 1, cell.trim())?;
    }
    Ok(ids)
}

fn column_index<'a, I: Iterator<Item = &'a str>>(mut headers: I, column: &str) -> Result<usize, LoadError> {
    headers
        .position(|h| h == column)
        .ok_or_else(|| LoadError::MissingColumn(column.to_owned()))
}

/// Parse one cell onto `ids`. Empty cells are skipped.
fn push_cell(ids: &mut Vec<u32>, row: usize, cell: &str) -> Result<(), LoadError> {
    if cell.is_empty() {
        return Ok(());
    }
    let id = parse_id(cell).ok_or_else(|| LoadError::Parse {
        row,
        value: cell.to_owned(),
    })?;
    ids.push(id);
    Ok(())
}

/// `load_ids` straight into a filter.
pub fn load_filter<P: AsRef<Path>>(path: P, column: &str) -> Result<IdFilter, LoadError> {
    load_ids(path, column).map(IdFilter::from)
}

/// Parse a bare hex ID such as `7df` or `AAAAA`. A `0x` prefix is tolerated.
/// Returns `None` for anything that is not a valid 29 bit ID.
pub fn parse_id(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    u32::from_str_radix(digits, 16).ok().filter(|id| *id <= EFF_MASK)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TableKind {
    Workbook,
    Delimited(u8),
}

impl TableKind {
    fn of(path: &Path) -> TableKind {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => TableKind::Workbook,
            "tsv" | "tab" => TableKind::Delimited(b'\t'),
            _ => TableKind::Delimited(b','),
        }
    }
}
