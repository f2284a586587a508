//! REST API types for frontend integration.
//!
//! Tables are sent as `{ "columns": [...], "rows": [[...], ...] }` with
//! cells as JSON scalars (`null` for empty).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{PipelineError, ServerError, SheetError};
use crate::models::{example_table, Table};
use crate::parser::SourceFormat;
use crate::transform::pipeline::{process_table, GroupedResult, PipelineOutput};

/// Response sent after an upload was grouped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Always "ready"; failures use [`error_response`].
    pub status: String,

    /// Uploaded rows, unchanged.
    pub raw: Table,

    /// One row per distinct `Type`.
    pub grouped: Table,

    pub metadata: PreviewMetadata,
}

/// Metadata about the transformation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMetadata {
    pub file_name: Option<String>,
    /// "xlsx", "xls" or "csv"
    pub format: String,
    pub encoding: Option<String>,
    pub delimiter: Option<String>,
    pub sheet_name: Option<String>,
    pub columns: Vec<String>,
    pub separator: String,
    pub total_rows: usize,
    pub total_groups: usize,
    /// Whether the result was served from the cache
    pub cached: bool,
}

impl PreviewResponse {
    pub fn from_output(output: &PipelineOutput, file_name: Option<String>) -> Self {
        let processed = &output.processed;
        let source = &processed.source;
        let result = &processed.grouped;

        Self {
            job_id: Uuid::new_v4().to_string(),
            status: "ready".to_string(),
            raw: result.raw.clone(),
            grouped: result.grouped.clone(),
            metadata: PreviewMetadata {
                file_name,
                format: format_label(source.format),
                encoding: source.encoding.clone(),
                delimiter: source.delimiter.map(String::from),
                sheet_name: source.sheet_name.clone(),
                columns: source.columns.clone(),
                separator: result.separator.clone(),
                total_rows: result.total_rows(),
                total_groups: result.total_groups(),
                cached: output.cached,
            },
        }
    }
}

/// Built-in example, raw and grouped with the requested separator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleResponse {
    pub raw: Table,
    pub grouped: Table,
    pub separator: String,
}

impl ExampleResponse {
    pub fn build(separator: &str) -> Result<Self, ServerError> {
        let GroupedResult {
            raw,
            grouped,
            separator,
        } = process_table(example_table(), separator).map_err(PipelineError::from)?;
        Ok(Self {
            raw,
            grouped,
            separator,
        })
    }
}

fn format_label(format: SourceFormat) -> String {
    match format {
        SourceFormat::Xlsx => "xlsx",
        SourceFormat::Xls => "xls",
        SourceFormat::Csv => "csv",
    }
    .to_string()
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(err) => match err {
                PipelineError::Sheet(SheetError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
                PipelineError::Sheet(SheetError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::Sheet(_) | PipelineError::Schema(_) => StatusCode::BAD_REQUEST,
                PipelineError::Export(_) | PipelineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), Json(error_response(&self.to_string()))).into_response()
    }
}
