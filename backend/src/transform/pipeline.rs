//! High-level pipeline: file bytes → validated table → grouped result.
//!
//! ```text
//! bytes ──parse──▶ Table ──validate──▶ Table ──group──▶ GroupedResult ──export──▶ .xlsx
//! ```
//!
//! [`process_table`] is the pure core. The `process_*` functions around it
//! add decoding, logging and, optionally, a [`ResultCache`] lookup.
//!
//! # Example
//!
//! ```rust,ignore
//! use classifier::{process_file, TransformOptions};
//!
//! let output = process_file("objects.xlsx", &TransformOptions::default())?;
//! println!("{} types", output.processed.grouped.total_groups());
//! std::fs::write("classified_result.xlsx", output.processed.grouped.to_workbook()?)?;
//! ```

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::grouper::group;
use crate::api::logs::{log_error, log_info, log_info_indent, log_success};
use crate::cache::{CacheKey, ResultCache};
use crate::config::{DEFAULT_MAX_UPLOAD_MB, DEFAULT_SEPARATOR};
use crate::error::{ExportResult, PipelineResult, SchemaError, SheetError};
use crate::models::Table;
use crate::parser::{parse_bytes, ParseResult, SourceFormat};
use crate::spreadsheet::WorkbookWriter;
use crate::validation::validate;

/// Column whose values define the groups.
pub const GROUP_COLUMN: &str = "Type";

/// Column whose values are joined per group.
pub const VALUE_COLUMN: &str = "Object Name";

/// Columns every input must carry.
pub const REQUIRED_COLUMNS: [&str; 2] = [GROUP_COLUMN, VALUE_COLUMN];

/// Sheet holding the derived table in the exported workbook.
pub const GROUPED_SHEET: &str = "Grouped Data";

/// Sheet holding the original rows in the exported workbook.
pub const RAW_SHEET: &str = "Raw Data";

/// Options for the transformation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Placed verbatim between joined values.
    pub separator: String,
    /// Inputs larger than this are rejected before decoding.
    pub max_bytes: Option<usize>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            max_bytes: Some(DEFAULT_MAX_UPLOAD_MB * 1024 * 1024),
        }
    }
}

/// Original table and its grouped summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedResult {
    pub raw: Table,
    pub grouped: Table,
    pub separator: String,
}

impl GroupedResult {
    pub fn total_rows(&self) -> usize {
        self.raw.len()
    }

    pub fn total_groups(&self) -> usize {
        self.grouped.len()
    }

    /// Encode as a workbook: grouped sheet first, raw sheet second.
    pub fn to_workbook(&self) -> ExportResult<Vec<u8>> {
        let mut writer = WorkbookWriter::new();
        writer
            .add_sheet(GROUPED_SHEET, &self.grouped)?
            .add_sheet(RAW_SHEET, &self.raw)?;
        writer.finish()
    }
}

/// How the source file was decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub format: SourceFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub sheet_name: Option<String>,
    pub size_bytes: usize,
    pub columns: Vec<String>,
}

/// A finished transformation, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Processed {
    pub source: SourceInfo,
    pub grouped: GroupedResult,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub processed: Arc<Processed>,
    /// True when the result came from the cache.
    pub cached: bool,
}

/// Validate `table` and group it by [`GROUP_COLUMN`].
///
/// No I/O and no logging; the table is returned untouched as `raw`.
pub fn process_table(table: Table, separator: &str) -> Result<GroupedResult, SchemaError> {
    let raw = validate(table, &REQUIRED_COLUMNS)?;
    let grouped = group(&raw, GROUP_COLUMN, VALUE_COLUMN, separator)?;
    Ok(GroupedResult {
        raw,
        grouped,
        separator: separator.to_string(),
    })
}

/// Decode and transform file bytes.
pub fn process_bytes(
    bytes: &[u8],
    file_name: Option<&str>,
    options: &TransformOptions,
) -> PipelineResult<PipelineOutput> {
    let processed = run(bytes, file_name, options)?;
    Ok(PipelineOutput {
        processed: Arc::new(processed),
        cached: false,
    })
}

/// Like [`process_bytes`], reusing a cached result for identical input.
pub fn process_bytes_cached(
    cache: &ResultCache<Processed>,
    bytes: &[u8],
    file_name: Option<&str>,
    options: &TransformOptions,
) -> PipelineResult<PipelineOutput> {
    check_size(bytes, options)?;
    let key = CacheKey::new(bytes, &options.separator);
    let format = SourceFormat::detect(file_name, bytes)?;

    if let Some(processed) = cache.get(&key) {
        if processed.source.format == format {
            log_success(format!("Reusing cached result ({})", &key.as_str()[..12]));
            return Ok(PipelineOutput {
                processed,
                cached: true,
            });
        }
    }

    let processed = run(bytes, file_name, options)?;
    Ok(PipelineOutput {
        processed: cache.insert(key, processed),
        cached: false,
    })
}

/// Read and transform a file from disk.
pub fn process_file<P: AsRef<Path>>(path: P, options: &TransformOptions) -> PipelineResult<PipelineOutput> {
    let path = path.as_ref();
    log_info(format!("📄 Processing: {}", path.display()));
    let bytes = std::fs::read(path)?;
    process_bytes(&bytes, path.file_name().and_then(|n| n.to_str()), options)
}

fn check_size(bytes: &[u8], options: &TransformOptions) -> Result<(), SheetError> {
    match options.max_bytes {
        Some(limit) if bytes.len() > limit => Err(SheetError::TooLarge {
            size: bytes.len(),
            limit,
        }),
        _ => Ok(()),
    }
}

fn run(bytes: &[u8], file_name: Option<&str>, options: &TransformOptions) -> PipelineResult<Processed> {
    check_size(bytes, options)?;

    log_info("📖 Reading file...");
    let parsed = parse_bytes(bytes, file_name).map_err(|e| {
        log_error(format!("Cannot read file: {}", e));
        e
    })?;
    let source = describe(&parsed, bytes.len());
    log_parsed(&source, &parsed.table);

    log_info("✔️  Checking required columns...");
    let grouped = process_table(parsed.table, &options.separator).map_err(|e| {
        log_error(e.to_string());
        e
    })?;
    log_success(format!("Found {}", REQUIRED_COLUMNS.join(" and ")));

    log_info(format!("📦 Grouping by {}...", GROUP_COLUMN));
    log_success(format!(
        "{} rows → {} groups (separator {:?})",
        grouped.total_rows(),
        grouped.total_groups(),
        grouped.separator
    ));

    Ok(Processed { source, grouped })
}

fn describe(parsed: &ParseResult, size_bytes: usize) -> SourceInfo {
    SourceInfo {
        format: parsed.format,
        encoding: parsed.encoding.clone(),
        delimiter: parsed.delimiter,
        sheet_name: parsed.sheet_name.clone(),
        size_bytes,
        columns: parsed.table.columns().to_vec(),
    }
}

fn log_parsed(source: &SourceInfo, table: &Table) {
    match source.format {
        SourceFormat::Xlsx | SourceFormat::Xls => {
            log_success(format!(
                "Read sheet '{}'",
                source.sheet_name.as_deref().unwrap_or("?")
            ));
        }
        SourceFormat::Csv => {
            log_success(format!(
                "Detected encoding: {}",
                source.encoding.as_deref().unwrap_or("?")
            ));
            log_success(format!(
                "Detected separator: '{}'",
                source.delimiter.map(format_delimiter).unwrap_or_default()
            ));
        }
    }
    log_success(format!("Read {} rows", table.len()));
    log_info(format!("📋 {} columns:", table.columns().len()));
    for (i, col) in table.columns().iter().enumerate() {
        log_info_indent(format!("[{:2}] {}", i + 1, col), 1);
    }
}

/// Format a delimiter for display.
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}
