// Export routes - render a previously returned AnalysisResult as a document

use axum::{
    extract::{rejection::JsonRejection, Path},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crate::error::ApiError;
use crate::export::{export_file_name, ExportFormat};
use crate::models::ExportRequest;
use crate::AppState;

fn render(
    format: ExportFormat,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let result = request.analysis_result.ok_or(ApiError::MissingAnalysis)?;

    let bytes = format.render(&result)?;
    let file_name = export_file_name(request.file_name.as_deref(), format);
    tracing::info!(
        "Exported report {} as {} ({} bytes)",
        result.report_id,
        file_name,
        bytes.len()
    );

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(format.content_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// POST /api/export/:format - txt | text | xlsx | excel | pdf
async fn export_report(
    Path(format): Path<String>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = format.parse()?;
    render(format, payload)
}

/// POST /api/generate-pdf - Legacy PDF endpoint
async fn generate_pdf(
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    render(ExportFormat::Pdf, payload)
}

pub fn export_routes() -> Router<AppState> {
    Router::new()
        .route("/api/export/:format", post(export_report))
        .route("/api/generate-pdf", post(generate_pdf))
}
