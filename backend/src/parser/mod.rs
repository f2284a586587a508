//! Decode uploaded files into [`Table`]s.
//!
//! Three source formats are supported:
//!
//! - `.xlsx` - first worksheet, read through [`crate::spreadsheet`]
//! - `.xls` - first worksheet of a BIFF8 workbook, see [`crate::spreadsheet::xls`]
//! - `.csv` - encoding and delimiter auto-detected, see [`csv`]
//!
//! The format is chosen from the file extension when one is given, and
//! from the content otherwise (zip magic means xlsx, OLE magic means xls).
//!
//! The first non-empty row is the header. Header cells that are blank are
//! named `Unnamed: {index}`; repeated names get a `.1`, `.2`, ... suffix so
//! every column stays addressable.

pub mod csv;

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{SheetError, SheetResult};
use crate::models::{Cell, Table};
use crate::spreadsheet::{is_ole, is_zip, read_first_sheet, xls, SheetGrid};

pub use self::csv::{decode_content, detect_delimiter, detect_encoding};

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SourceFormat {
    /// Pick the format from a file name, falling back to content sniffing.
    pub fn detect(file_name: Option<&str>, bytes: &[u8]) -> SheetResult<Self> {
        let extension = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("xlsx") | Some("xlsm") => Ok(SourceFormat::Xlsx),
            Some("xls") => Ok(SourceFormat::Xls),
            Some("csv") | Some("txt") | Some("tsv") => Ok(SourceFormat::Csv),
            Some(other) => Err(SheetError::UnsupportedFormat(format!(".{}", other))),
            None if is_zip(bytes) => Ok(SourceFormat::Xlsx),
            None if is_ole(bytes) => Ok(SourceFormat::Xls),
            None => Ok(SourceFormat::Csv),
        }
    }
}

/// Parsed table plus how it was decoded.
#[derive(Debug, Clone, Serialize)]
pub struct ParseResult {
    pub table: Table,
    pub format: SourceFormat,
    /// Detected text encoding (csv only).
    pub encoding: Option<String>,
    /// Detected delimiter (csv only).
    pub delimiter: Option<char>,
    /// Worksheet the table was read from (xlsx and xls only).
    pub sheet_name: Option<String>,
}

/// Parse raw file bytes, choosing the format from `file_name` or content.
pub fn parse_bytes(bytes: &[u8], file_name: Option<&str>) -> SheetResult<ParseResult> {
    match SourceFormat::detect(file_name, bytes)? {
        SourceFormat::Xlsx => parse_xlsx(bytes),
        SourceFormat::Xls => parse_xls(bytes),
        SourceFormat::Csv => parse_csv_bytes(bytes),
    }
}

/// Read and parse a file from disk.
pub fn parse_file<P: AsRef<Path>>(path: P) -> SheetResult<ParseResult> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    parse_bytes(&bytes, path.file_name().and_then(|n| n.to_str()))
}

/// Parse the first worksheet of an xlsx file.
pub fn parse_xlsx(bytes: &[u8]) -> SheetResult<ParseResult> {
    from_sheet(read_first_sheet(bytes)?, SourceFormat::Xlsx)
}

/// Parse the first worksheet of a legacy xls file.
pub fn parse_xls(bytes: &[u8]) -> SheetResult<ParseResult> {
    from_sheet(xls::read_first_sheet(bytes)?, SourceFormat::Xls)
}

fn from_sheet(grid: SheetGrid, format: SourceFormat) -> SheetResult<ParseResult> {
    let table = table_from_grid(grid.rows, true)?;
    Ok(ParseResult {
        table,
        format,
        encoding: None,
        delimiter: None,
        sheet_name: Some(grid.name),
    })
}

/// Parse CSV bytes with encoding and delimiter auto-detection.
pub fn parse_csv_bytes(bytes: &[u8]) -> SheetResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    parse_csv_str(&content, delimiter, encoding)
}

/// Parse already-decoded CSV text with an explicit delimiter.
pub fn parse_csv_str(content: &str, delimiter: char, encoding: String) -> SheetResult<ParseResult> {
    let rows = csv::read_records(content, delimiter)?;
    let table = table_from_grid(rows, false)?;
    Ok(ParseResult {
        table,
        format: SourceFormat::Csv,
        encoding: Some(encoding),
        delimiter: Some(delimiter),
        sheet_name: None,
    })
}

/// Build a table whose header is the first grid row.
///
/// With `widen_header`, rows wider than the header add `Unnamed` columns,
/// as spreadsheets often carry stray cells to the right. Otherwise a wide
/// row is an error.
pub fn table_from_grid(mut rows: Vec<Vec<Cell>>, widen_header: bool) -> SheetResult<Table> {
    if rows.is_empty() {
        return Err(SheetError::NoHeaders);
    }
    let header = rows.remove(0);

    let width = if widen_header {
        rows.iter().map(Vec::len).fold(header.len(), usize::max)
    } else {
        header.len()
    };
    let mut names: Vec<String> = header.iter().map(Cell::to_text).collect();
    names.resize(width, String::new());

    Ok(Table::from_rows(normalize_headers(names), rows)?)
}

/// Name blank headers and make repeated names unique.
pub fn normalize_headers(names: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(names.len());
    let mut result = Vec::with_capacity(names.len());

    for (index, name) in names.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {}", index)
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while used.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        used.insert(candidate.clone());
        result.push(candidate);
    }

    result
}
