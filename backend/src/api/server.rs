//! HTTP Server for the gradebridge API.
//!
//! Provides REST endpoints for uploading a gradebook and a provider report
//! and downloading the merged gradebook.
//!
//! # API Endpoints
//!
//! | Method | Path               | Description                              |
//! |--------|--------------------|------------------------------------------|
//! | GET    | `/health`          | Health check                             |
//! | POST   | `/api/assignments` | List gradeable assignments of a provider |
//! | POST   | `/api/merge`       | Merge provider grades into a gradebook   |
//! | GET    | `/api/logs`        | SSE stream for real-time logs            |
//!
//! # Multipart fields
//!
//! | Field         | Used by        | Content                                  |
//! |---------------|----------------|------------------------------------------|
//! | `gradebook`   | merge          | Gradebook CSV file                       |
//! | `provider`    | both           | Provider CSV file                        |
//! | `assignments` | merge          | JSON array of names, or one name per field |
//! | `zeroBlanks`  | merge          | `true` to write 0 for blank scores       |
//! | `selectAll`   | merge          | `true` to merge every gradeable column   |
//! | `delimiter`   | both           | Force a delimiter (`\t` for tab)         |

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, AssignmentsResponse, MergeResponse};
use crate::config::{Settings, MAX_UPLOAD_SIZE};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::merge::pipeline::{list_assignments_from_bytes, update_grades_from_bytes, MergeOptions};
use crate::models::BlankPolicy;
use crate::parser;

type ApiError = (StatusCode, Json<Value>);

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> ServerResult<()> {
    let port = settings.port;

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let app = router(Arc::new(settings)).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Gradebridge server running on http://localhost:{}", port);
    println!("   POST /api/assignments - List provider assignments");
    println!("   POST /api/merge       - Merge provider grades");
    println!("   GET  /api/logs        - SSE log stream");
    println!("   GET  /health          - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(settings: Arc<Settings>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/assignments", post(list_assignments))
        .route("/api/merge", post(merge_grades))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .with_state(settings)
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "gradebridge",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "assignments": "POST /api/assignments",
            "merge": "POST /api/merge",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Fields collected from a multipart upload.
#[derive(Debug, Default)]
struct Upload {
    gradebook: Option<Vec<u8>>,
    provider: Option<Vec<u8>>,
    options: MergeOptions,
}

impl Upload {
    /// Apply one text field.
    fn set_text(&mut self, name: &str, value: &str) -> ServerResult<()> {
        match name {
            "assignments" => {
                let value = value.trim();
                if value.starts_with('[') {
                    let names: Vec<String> = serde_json::from_str(value).map_err(|e| {
                        ServerError::BadRequest(format!("assignments must be a JSON array of strings: {}", e))
                    })?;
                    self.options.selected.extend(names);
                } else if !value.is_empty() {
                    self.options.selected.push(value.to_string());
                }
            }
            "zeroBlanks" => {
                self.options.blank_policy = BlankPolicy::from_flag(parse_flag(value));
            }
            "selectAll" => self.options.select_all = parse_flag(value),
            "delimiter" => self.options.delimiter = parse_delimiter(value)?,
            _ => {}
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn parse_delimiter(value: &str) -> ServerResult<Option<char>> {
    if value.is_empty() {
        return Ok(None);
    }
    parser::parse_delimiter(value)
        .map(Some)
        .map_err(|e| ServerError::BadRequest(e.to_string()))
}

fn bad_request(message: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(&message.to_string())))
}

fn pipeline_error(e: PipelineError) -> ApiError {
    log_error(format!("❌ {}", e));
    let status = match e {
        PipelineError::Load(_) | PipelineError::Mapping(_) => StatusCode::BAD_REQUEST,
        PipelineError::Io(_) | PipelineError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error_response(&e.to_string())))
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "gradebook" | "provider" => {
                let file_name = field.file_name().unwrap_or("unknown").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Read error: {}", e)))?
                    .to_vec();
                log_info(format!("📄 {}: {} ({} bytes)", name, file_name, bytes.len()));
                if name == "gradebook" {
                    upload.gradebook = Some(bytes);
                } else {
                    upload.provider = Some(bytes);
                }
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Read error: {}", e)))?;
                upload.set_text(&name, &text).map_err(bad_request)?;
            }
        }
    }

    Ok(upload)
}

/// List gradeable assignments of an uploaded provider report
async fn list_assignments(
    State(_settings): State<Arc<Settings>>,
    multipart: Multipart,
) -> Result<Json<AssignmentsResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let provider = upload
        .provider
        .ok_or_else(|| bad_request("No provider file provided"))?;
    let delimiter = upload.options.delimiter;

    let listing = tokio::task::spawn_blocking(move || list_assignments_from_bytes(&provider, delimiter))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(&e.to_string()))))?
        .map_err(pipeline_error)?;

    Ok(Json(AssignmentsResponse::from(listing)))
}

/// Merge an uploaded provider report into an uploaded gradebook
async fn merge_grades(
    State(settings): State<Arc<Settings>>,
    multipart: Multipart,
) -> Result<Json<MergeResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let gradebook = upload
        .gradebook
        .ok_or_else(|| bad_request("No gradebook file provided"))?;
    let provider = upload
        .provider
        .ok_or_else(|| bad_request("No provider file provided"))?;

    let mut options = upload.options;
    options.mapping_path = settings.mapping_path(None);

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 NEW MERGE: {} assignment(s){}",
        options.selected.len(),
        if options.select_all { " (all)" } else { "" }
    );
    println!("{}\n", "=".repeat(70));

    let output = tokio::task::spawn_blocking(move || {
        update_grades_from_bytes(&gradebook, &provider, &options)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(&e.to_string()))))?
    .map_err(pipeline_error)?;

    Ok(Json(MergeResponse::from(output)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignments_json_array() {
        let mut upload = Upload::default();
        upload
            .set_text("assignments", r#"["Quiz1", "Checkpoint Exam: Network Access"]"#)
            .unwrap();
        assert_eq!(
            upload.options.selected,
            vec!["Quiz1".to_string(), "Checkpoint Exam: Network Access".to_string()]
        );
    }

    #[test]
    fn test_assignments_repeated_fields() {
        let mut upload = Upload::default();
        upload.set_text("assignments", "Quiz1").unwrap();
        upload.set_text("assignments", "Quiz2").unwrap();
        upload.set_text("assignments", "  ").unwrap();
        assert_eq!(upload.options.selected, vec!["Quiz1", "Quiz2"]);
    }

    #[test]
    fn test_bad_assignments_json() {
        let mut upload = Upload::default();
        let err = upload.set_text("assignments", "[1, 2").unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[test]
    fn test_flags_and_delimiter() {
        let mut upload = Upload::default();
        upload.set_text("zeroBlanks", "true").unwrap();
        upload.set_text("selectAll", "1").unwrap();
        upload.set_text("delimiter", "\\t").unwrap();
        upload.set_text("unknown", "ignored").unwrap();

        assert_eq!(upload.options.blank_policy, BlankPolicy::SetZero);
        assert!(upload.options.select_all);
        assert_eq!(upload.options.delimiter, Some('\t'));

        upload.set_text("zeroBlanks", "false").unwrap();
        assert_eq!(upload.options.blank_policy, BlankPolicy::LeaveUnset);
        assert!(upload.set_text("delimiter", ";;").is_err());
        assert!(matches!(
            upload.set_text("delimiter", "§"),
            Err(ServerError::BadRequest(_))
        ));
        upload.set_text("delimiter", "").unwrap();
        assert_eq!(upload.options.delimiter, None);
    }
}
