//! HTTP Server for the classifier API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                              |
//! |--------|-------------------|------------------------------------------|
//! | GET    | `/health`         | Health check                             |
//! | GET    | `/api/example`    | Built-in example, raw and grouped        |
//! | POST   | `/api/preview`    | Upload a file, get both tables as JSON   |
//! | POST   | `/api/download`   | Upload a file, get the result workbook   |
//! | GET    | `/api/logs`       | SSE stream for real-time logs            |
//!
//! Uploads are `multipart/form-data` with a `file` field and optional
//! `separator` and `filename` (download name) fields.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{ExampleResponse, PreviewResponse};
use crate::cache::ResultCache;
use crate::config::{AppConfig, DEFAULT_OUTPUT_NAME};
use crate::error::{ServerError, ServerResult};
use crate::spreadsheet::XLSX_MIME;
use crate::transform::pipeline::{process_bytes_cached, PipelineOutput, Processed, TransformOptions};

/// Room for multipart boundaries and the small text fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<ResultCache<Processed>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let cache = ResultCache::new(config.cache_entries);
        Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);
    let body_limit = state.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/example", get(example))
        .route("/api/preview", post(preview))
        .route("/api/download", post(download))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let app = router(AppState::new(config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Classifier server running on http://localhost:{}", port);
    println!("   GET  /api/example  - Built-in example");
    println!("   POST /api/preview  - Upload file, JSON preview");
    println!("   POST /api/download - Upload file, xlsx result");
    println!("   GET  /api/logs     - SSE log stream");
    println!("   GET  /health       - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "classifier",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "example": "GET /api/example",
            "preview": "POST /api/preview",
            "download": "POST /api/download",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip the entries they missed.
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[derive(Debug, Deserialize)]
struct ExampleQuery {
    separator: Option<String>,
}

async fn example(
    State(state): State<AppState>,
    Query(query): Query<ExampleQuery>,
) -> ServerResult<Json<ExampleResponse>> {
    let separator = query.separator.unwrap_or_else(|| state.config.separator.clone());
    Ok(Json(ExampleResponse::build(&separator)?))
}

async fn preview(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServerResult<Json<PreviewResponse>> {
    let form = read_upload(multipart, state.config.max_upload_bytes).await?;
    let file_name = form.file_name.clone();
    let output = run_blocking(state, form).await?;
    Ok(Json(PreviewResponse::from_output(&output, file_name)))
}

async fn download(State(state): State<AppState>, multipart: Multipart) -> ServerResult<Response> {
    let form = read_upload(multipart, state.config.max_upload_bytes).await?;
    let name = download_name(form.output_name.as_deref(), &state.config.output_name);
    let output = run_blocking(state, form).await?;

    let bytes = tokio::task::spawn_blocking(move || output.processed.grouped.to_workbook())
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(crate::error::PipelineError::from)?;
    log_info(format!("📥 Sending {} ({} bytes)", name, bytes.len()));

    let headers = [
        (header::CONTENT_TYPE, XLSX_MIME.to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name)),
    ];
    Ok((StatusCode::OK, headers, bytes).into_response())
}

/// Fields of an upload form.
#[derive(Debug, Default)]
struct UploadForm {
    bytes: Option<Vec<u8>>,
    file_name: Option<String>,
    separator: Option<String>,
    output_name: Option<String>,
}

async fn read_upload(mut multipart: Multipart, limit: usize) -> ServerResult<UploadForm> {
    let mut form = UploadForm::default();
    let multipart_err = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge { limit }
        } else {
            ServerError::BadRequest(format!("Multipart error: {}", e))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(|s| s.to_string());
                let data = field.bytes().await.map_err(multipart_err)?;
                if data.len() > limit {
                    return Err(ServerError::PayloadTooLarge { limit });
                }
                form.bytes = Some(data.to_vec());
            }
            // Kept verbatim: surrounding spaces are part of the separator.
            "separator" => form.separator = Some(field.text().await.map_err(multipart_err)?),
            "filename" => form.output_name = Some(field.text().await.map_err(multipart_err)?),
            _ => {}
        }
    }

    if form.bytes.is_none() {
        return Err(ServerError::BadRequest("No file provided".into()));
    }
    Ok(form)
}

async fn run_blocking(state: AppState, form: UploadForm) -> ServerResult<PipelineOutput> {
    tokio::task::spawn_blocking(move || run_upload(&state, form))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
}

fn run_upload(state: &AppState, form: UploadForm) -> ServerResult<PipelineOutput> {
    let bytes = form
        .bytes
        .ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;
    let options = TransformOptions {
        separator: form.separator.unwrap_or_else(|| state.config.separator.clone()),
        max_bytes: Some(state.config.max_upload_bytes),
    };

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 NEW UPLOAD: {} ({} bytes)",
        form.file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    );
    println!("{}\n", "=".repeat(70));

    Ok(process_bytes_cached(
        &state.cache,
        &bytes,
        form.file_name.as_deref(),
        &options,
    )?)
}

/// Safe attachment name ending in `.xlsx`.
///
/// Directory parts and characters that would break the header are dropped.
/// A name left empty falls back to `default`, then to [`DEFAULT_OUTPUT_NAME`].
pub fn download_name(requested: Option<&str>, default: &str) -> String {
    let mut name = [requested, Some(default)]
        .into_iter()
        .flatten()
        .map(clean_file_name)
        .find(|name| !name.is_empty() && !name.eq_ignore_ascii_case(".xlsx"))
        .unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string());

    if !name.to_ascii_lowercase().ends_with(".xlsx") {
        name.push_str(".xlsx");
    }
    name
}

fn clean_file_name(raw: &str) -> String {
    let base = raw.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(raw);
    base.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && !matches!(c, '"' | ';'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_name_default() {
        assert_eq!(download_name(None, "classified_result.xlsx"), "classified_result.xlsx");
    }

    #[test]
    fn test_download_name_adds_extension() {
        assert_eq!(download_name(Some("report"), "out.xlsx"), "report.xlsx");
        assert_eq!(download_name(Some("Report.XLSX"), "out.xlsx"), "Report.XLSX");
    }

    #[test]
    fn test_download_name_strips_paths_and_quotes() {
        assert_eq!(download_name(Some("../../etc/\"x\""), "out.xlsx"), "x.xlsx");
        assert_eq!(download_name(Some("C:\\tmp\\r.xlsx"), "out.xlsx"), "r.xlsx");
    }

    #[test]
    fn test_download_name_blank_falls_back() {
        assert_eq!(download_name(Some("  "), "out.xlsx"), "out.xlsx");
        assert_eq!(download_name(Some("/"), "out"), "out.xlsx");
        assert_eq!(download_name(Some("é"), "é"), "classified_result.xlsx");
    }

    fn state_with(cache_entries: usize) -> AppState {
        AppState::new(AppConfig {
            cache_entries,
            ..AppConfig::default()
        })
    }

    #[test]
    fn test_run_upload_uses_form_separator() {
        let state = state_with(4);
        let form = UploadForm {
            bytes: Some(b"Type,Object Name\nView,A\nView,B\n".to_vec()),
            file_name: Some("v.csv".into()),
            separator: Some(" | ".into()),
            output_name: None,
        };

        let output = run_upload(&state, form).unwrap();
        assert_eq!(output.processed.grouped.separator, " | ");
        assert_eq!(state.cache.len(), 1);
    }

    #[test]
    fn test_run_upload_config_separator_and_cache() {
        let state = state_with(4);
        let form = || UploadForm {
            bytes: Some(b"Type,Object Name\nView,A\nView,B\n".to_vec()),
            ..UploadForm::default()
        };

        let first = run_upload(&state, form()).unwrap();
        let second = run_upload(&state, form()).unwrap();

        assert_eq!(first.processed.grouped.separator, " OR ");
        assert!(!first.cached);
        assert!(second.cached);
    }

    #[test]
    fn test_run_upload_missing_columns() {
        let state = state_with(0);
        let form = UploadForm {
            bytes: Some(b"Name\nx\n".to_vec()),
            ..UploadForm::default()
        };

        let err = run_upload(&state, form).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("Object Name"));
    }

    #[test]
    fn test_run_upload_without_file() {
        let err = run_upload(&state_with(0), UploadForm::default()).unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }
}
