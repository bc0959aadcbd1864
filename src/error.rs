// API error type - every handler failure becomes a JSON body with a stable code

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::analysis::AnalysisError;
use crate::export::ExportError;
use crate::llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no file was uploaded")]
    MissingFile,

    #[error("analysisResult is required")]
    MissingAnalysis,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("file exceeds the {limit} byte upload limit")]
    PayloadTooLarge { limit: usize },

    #[error("unsupported file type: {0}")]
    UnsupportedMediaType(String),

    #[error("too many requests")]
    RateLimited { retry_after: u64 },

    #[error("analysis service is not configured")]
    NotConfigured,

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::MissingAnalysis | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Analysis(AnalysisError::Refused) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(AnalysisError::Parse(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Analysis(AnalysisError::Llm(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Export(ExportError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingFile => "MISSING_FILE",
            ApiError::MissingAnalysis => "MISSING_ANALYSIS",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::PayloadTooLarge { .. } => "FILE_TOO_LARGE",
            ApiError::UnsupportedMediaType(_) => "UNSUPPORTED_FILE_TYPE",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::NotConfigured => "NOT_CONFIGURED",
            ApiError::Analysis(AnalysisError::Refused) => "ANALYSIS_REFUSED",
            ApiError::Analysis(AnalysisError::Parse(_)) => "PARSE_ERROR",
            ApiError::Analysis(AnalysisError::Llm(_)) => "UPSTREAM_ERROR",
            ApiError::Export(ExportError::UnsupportedFormat(_)) => "UNSUPPORTED_FORMAT",
            ApiError::Export(_) => "EXPORT_FAILED",
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, details, hint): (String, Option<String>, Option<String>) = match self {
            ApiError::MissingFile => (
                "No file was uploaded".to_string(),
                None,
                Some("Send the report in the 'image' or 'file' multipart field".to_string()),
            ),
            ApiError::PayloadTooLarge { limit } => (
                "File is too large".to_string(),
                Some(self.to_string()),
                Some(format!("Maximum upload size is {} MB", limit / (1024 * 1024))),
            ),
            ApiError::UnsupportedMediaType(_) => (
                "Unsupported file type".to_string(),
                Some(self.to_string()),
                Some("Upload a JPEG, PNG or PDF file".to_string()),
            ),
            ApiError::RateLimited { retry_after } => (
                "Too many requests".to_string(),
                None,
                Some(format!("Try again in {} seconds", retry_after)),
            ),
            ApiError::NotConfigured => (
                "Analysis service is not configured".to_string(),
                None,
                Some("Set OPENAI_API_KEY on the server".to_string()),
            ),
            ApiError::Analysis(AnalysisError::Refused) => (
                "The model declined to analyze this file".to_string(),
                None,
                Some(
                    "Remove or mask personal information (names, ID numbers) in the image and try again"
                        .to_string(),
                ),
            ),
            ApiError::Analysis(AnalysisError::Parse(e)) => (
                "Could not parse the analysis result".to_string(),
                Some(e.to_string()),
                Some("Try again; large reports may need a higher LLM_MAX_TOKENS".to_string()),
            ),
            ApiError::Analysis(AnalysisError::Llm(e)) => (
                "Analysis service request failed".to_string(),
                Some(e.to_string()),
                match e {
                    LlmError::Status { status: 401, .. } => {
                        Some("Check that OPENAI_API_KEY is valid".to_string())
                    }
                    LlmError::Status { status: 429, .. } => {
                        Some("The model provider is rate limiting requests".to_string())
                    }
                    _ => None,
                },
            ),
            ApiError::Export(e) => ("Export failed".to_string(), Some(e.to_string()), None),
            ApiError::MissingAnalysis | ApiError::BadRequest(_) => (self.to_string(), None, None),
        };

        ErrorBody {
            error,
            code: self.code(),
            details,
            hint,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{} {}: {}", status.as_u16(), self.code(), self);
        } else {
            tracing::warn!("{} {}: {}", status.as_u16(), self.code(), self);
        }

        let mut response = (status, Json(self.body())).into_response();
        if let ApiError::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::repair::RepairError;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::PayloadTooLarge { limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::UnsupportedMediaType("text/plain".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(ApiError::NotConfigured.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(AnalysisError::Refused).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AnalysisError::Parse(RepairError::NoJsonObject)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(AnalysisError::Llm(LlmError::EmptyResponse)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(ExportError::UnsupportedFormat("doc".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_rate_limited_response_has_retry_after() {
        let response = ApiError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
        let body = body_json(response).await;
        assert_eq!(body["code"], "RATE_LIMITED");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_upstream_error_body_carries_details_and_hint() {
        let err = ApiError::from(AnalysisError::Llm(LlmError::Status {
            status: 401,
            body: "invalid_api_key".to_string(),
        }));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["code"], "UPSTREAM_ERROR");
        assert!(body["details"].as_str().unwrap().contains("invalid_api_key"));
        assert!(body["hint"].as_str().unwrap().contains("OPENAI_API_KEY"));
    }
}
