//! # Classifier - group spreadsheet objects by type
//!
//! Classifier reads an object inventory (one row per object, with at least a
//! `Type` and an `Object Name` column), groups it by `Type` and joins each
//! group's distinct names with a separator such as `" OR "`. The result is
//! exported as a workbook holding the grouped table and the raw rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ xlsx / xls  │────▶│   Parser    │────▶│  Validate + │────▶│    xlsx     │
//! │  / csv      │     │  (auto-fmt) │     │    Group    │     │ (2 sheets)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use classifier::{example_table, process_table};
//!
//! let result = process_table(example_table(), " OR ")?;
//! println!("{} rows → {} groups", result.total_rows(), result.total_groups());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells and tables
//! - [`parser`] - xlsx / xls / csv decoding with auto-detection
//! - [`spreadsheet`] - Workbook reading and writing
//! - [`validation`] - Required column checks
//! - [`transform`] - Grouping and pipeline
//! - [`cache`] - Result caching
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Decoding / encoding
pub mod parser;
pub mod spreadsheet;

// Validation
pub mod validation;

// Transformation
pub mod transform;

// Caching
pub mod cache;

pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ExportError, PipelineError, PipelineResult, SchemaError, ServerError, SheetError, TableError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{example_table, Cell, Table};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{check, is_valid, missing_columns, validate};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{parse_bytes, parse_file, ParseResult, SourceFormat};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    process_bytes, process_bytes_cached, process_file, process_table, GroupedResult,
    PipelineOutput, Processed, SourceInfo, TransformOptions, GROUPED_SHEET, GROUP_COLUMN,
    RAW_SHEET, REQUIRED_COLUMNS, VALUE_COLUMN,
};
pub use transform::{group, join_distinct};

// =============================================================================
// Re-exports - Cache / Config
// =============================================================================

pub use cache::{CacheKey, ResultCache};
pub use config::AppConfig;

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, ExampleResponse, PreviewMetadata, PreviewResponse};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
