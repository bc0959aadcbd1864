// Analyze route - multipart upload -> two-stage LLM analysis

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::analysis::{analyze_report, PipelineSettings, UploadedReport};
use crate::error::ApiError;
use crate::models::{AnalysisResult, CaseInfo};
use crate::AppState;

pub const JPEG: &str = "image/jpeg";
pub const PNG: &str = "image/png";
pub const PDF: &str = "application/pdf";

/// Detect the upload type from its leading bytes. The declared
/// Content-Type is not trusted.
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(JPEG)
    } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(PNG)
    } else if data.starts_with(b"%PDF-") {
        Some(PDF)
    } else {
        None
    }
}

struct UploadedFile {
    file_name: String,
    declared_type: Option<String>,
    data: Vec<u8>,
}

fn multipart_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit }
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// POST /api/analyze - Analyze an uploaded report image or PDF
async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResult>, ApiError> {
    let limit = state.config.max_upload_bytes();
    let mut file: Option<UploadedFile> = None;
    let mut case = CaseInfo::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let declared_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file = Some(UploadedFile {
                    file_name,
                    declared_type,
                    data: data.to_vec(),
                });
            }
            other => {
                let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                if !case.set_field(other, value) {
                    tracing::debug!("Ignoring unknown multipart field: {}", other);
                }
            }
        }
    }

    let file = file.ok_or(ApiError::MissingFile)?;
    if file.data.is_empty() {
        return Err(ApiError::MissingFile);
    }
    if file.data.len() > limit {
        return Err(ApiError::PayloadTooLarge { limit });
    }

    let mime_type = sniff_mime(&file.data).ok_or_else(|| {
        ApiError::UnsupportedMediaType(
            file.declared_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        )
    })?;
    if let Some(declared) = &file.declared_type {
        if declared != mime_type {
            tracing::debug!("Declared type {} differs from sniffed {}", declared, mime_type);
        }
    }

    let llm = state.llm.clone().ok_or(ApiError::NotConfigured)?;

    let upload = UploadedReport {
        file_name: file.file_name,
        mime_type: mime_type.to_string(),
        data: file.data,
    };
    let settings = PipelineSettings::from_config(&state.config);
    let result = analyze_report(&*llm, &upload, &case, &settings).await?;

    tracing::info!(
        "Analysis {} complete: {} findings, {} primary codes, {} stage(s)",
        result.report_id,
        result.findings.len(),
        result.disease_codes.primary.len(),
        result.metadata.stages_completed
    );

    Ok(Json(result))
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new().route("/api/analyze", post(analyze))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]), Some(JPEG));
        assert_eq!(
            sniff_mime(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0]),
            Some(PNG)
        );
        assert_eq!(sniff_mime(b"%PDF-1.7\n"), Some(PDF));
        assert_eq!(sniff_mime(b"GIF89a"), None);
        assert_eq!(sniff_mime(b"<html>"), None);
        assert_eq!(sniff_mime(&[]), None);
    }
}
