//! Error types for the classifier pipeline.
//!
//! One error type per layer:
//!
//! - [`TableError`] - Table construction invariant violations
//! - [`SchemaError`] - Required columns missing from the input table
//! - [`SheetError`] - Source file decoding errors (xlsx / xls / csv)
//! - [`ExportError`] - Workbook encoding errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Table Errors
// =============================================================================

/// Errors raised while building a [`crate::models::Table`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// A row carries more cells than the table has columns.
    #[error("Row {row} has {width} cells but the table has {columns} columns")]
    RowTooWide {
        row: usize,
        width: usize,
        columns: usize,
    },

    /// Two columns share the same name.
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// One or more required columns are absent from the input table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("File must contain columns: {}; missing: {}", .required.join(", "), .missing.join(", "))]
pub struct SchemaError {
    /// Missing column names, in the order they were required.
    pub missing: Vec<String>,
    /// Every column that was required.
    pub required: Vec<String>,
}

// =============================================================================
// Source File Errors
// =============================================================================

/// Errors while decoding an uploaded spreadsheet or CSV file.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The xlsx container is not a readable zip archive.
    #[error("Invalid xlsx archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Malformed XML inside the workbook.
    #[error("Invalid workbook XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid workbook XML encoding: {0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),

    #[error("Invalid workbook XML attribute: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    /// Unknown entity or character reference in the workbook XML.
    #[error("Invalid XML entity: {0}")]
    XmlEntity(String),

    #[error("Invalid number in workbook: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    /// A part the workbook cannot be read without is absent.
    #[error("Workbook is missing part: {0}")]
    MissingPart(String),

    /// The workbook declares no worksheet.
    #[error("Workbook contains no worksheet")]
    NoWorksheet,

    /// The workbook has fewer worksheets than the requested position.
    #[error("Workbook has no worksheet at position {0}")]
    SheetNotFound(usize),

    /// A cell reference such as `B3` could not be parsed.
    #[error("Invalid cell reference: {0}")]
    CellReference(String),

    /// A cell lies beyond 1,048,576 rows or 16,384 columns (zero-based).
    #[error("Cell at row {row}, column {col} is outside the sheet limits")]
    CellOutOfRange { row: usize, col: usize },

    /// Damaged compound file or BIFF record stream in an `.xls` file.
    #[error("Invalid xls file: {0}")]
    Xls(String),

    #[error("Password protected workbooks are not supported")]
    PasswordProtected,

    /// Invalid CSV content.
    #[error("Invalid CSV format: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to decode text content.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// The source has no header row.
    #[error("No header row found")]
    NoHeaders,

    /// The decoded rows do not form a valid table.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),

    /// Neither xlsx, xls nor csv.
    #[error("Unsupported file format: {0} (expected .xlsx, .xls or .csv)")]
    UnsupportedFormat(String),

    /// The file exceeds the configured upload ceiling.
    #[error("File size too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: usize, limit: usize },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while encoding the output workbook.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Workbook IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Sheet names must be unique, non-empty and at most 31 characters.
    #[error("Invalid sheet name: {0:?}")]
    InvalidSheetName(String),

    /// A workbook needs at least one sheet.
    #[error("Workbook has no sheets")]
    Empty,
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// This is the main error type returned by [`crate::transform::pipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source file could not be decoded.
    #[error("File error: {0}")]
    Sheet(#[from] SheetError),

    /// Required columns are missing.
    #[error("{0}")]
    Schema(#[from] SchemaError),

    /// Output workbook could not be written.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload exceeds the configured limit.
    #[error("File size too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for source decoding.
pub type SheetResult<T> = Result<T, SheetError>;

/// Result type for workbook export.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
