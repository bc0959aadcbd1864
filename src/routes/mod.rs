// Routes module

pub mod analyze;
pub mod export;
pub mod health;

use axum::{extract::DefaultBodyLimit, middleware::from_fn_with_state, Router};

use crate::middleware::rate_limit;
use crate::AppState;

pub use analyze::analyze_routes;
pub use export::export_routes;
pub use health::health_routes;

/// Room for multipart boundaries and the case text fields
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// All routes with state applied. Rate limiting covers /api only.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes() + MULTIPART_OVERHEAD;

    let api = Router::new()
        .merge(analyze_routes())
        .merge(export_routes())
        .route_layer(from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(health_routes())
        .merge(api)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
        routing::post,
        Json,
    };
    use serde_json::{json, Value};
    use tokio::sync::Mutex as AsyncMutex;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::llm::LlmClient;
    use crate::middleware::RateLimiter;

    const BOUNDARY: &str = "----analyzer-test-boundary";
    const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn state(config: Config, llm: Option<LlmClient>) -> AppState {
        AppState {
            rate_limiter: Arc::new(AsyncMutex::new(RateLimiter::new(
                config.rate_limit_per_minute,
                config.rate_limit_per_hour,
            ))),
            llm: llm.map(Arc::new),
            config: Arc::new(config),
        }
    }

    fn small_config() -> Config {
        Config {
            max_upload_mb: 1,
            ..Config::default()
        }
    }

    /// (field name, file name, bytes)
    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn analyze_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    /// OpenAI-compatible stand-in that replays `responses` in order and
    /// records each request body
    async fn fake_openai(responses: Vec<&'static str>) -> (String, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let recorded = seen.clone();
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let seen = seen.clone();
                let responses = responses.clone();
                async move {
                    let mut seen = seen.lock().unwrap();
                    seen.push(body);
                    let content = responses
                        .get(seen.len() - 1)
                        .copied()
                        .unwrap_or("{}");
                    Json(json!({
                        "choices": [{
                            "message": { "role": "assistant", "content": content },
                            "finish_reason": "stop"
                        }]
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/v1", addr), recorded)
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state(Config::default(), None));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_analyze_requires_file() {
        let app = router(state(small_config(), None));
        let response = app
            .oneshot(analyze_request(&[("patientId", None, b"123".as_slice())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "MISSING_FILE");
    }

    #[tokio::test]
    async fn test_analyze_rejects_unknown_type() {
        let app = router(state(small_config(), None));
        let response = app
            .oneshot(analyze_request(&[("image", Some("notes.txt"), b"hello world".as_slice())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(response).await["code"], "UNSUPPORTED_FILE_TYPE");
    }

    #[tokio::test]
    async fn test_analyze_rejects_oversized_file() {
        let app = router(state(small_config(), None));
        let mut big = PNG_BYTES.to_vec();
        big.resize(1024 * 1024 + 1, 0);
        let response = app
            .oneshot(analyze_request(&[("image", Some("scan.png"), big.as_slice())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["code"], "FILE_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_analyze_without_api_key_is_unavailable() {
        let app = router(state(small_config(), None));
        let response = app
            .oneshot(analyze_request(&[("image", Some("scan.png"), PNG_BYTES)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["code"], "NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn test_analyze_end_to_end() {
        let (base_url, seen) = fake_openai(vec![
            "```json\n{\"examInfo\": {\"examType\": \"Brain MRI\"}, \"findings\": [{\"category\": \"Parenchyma\", \"description\": \"Old lacunar infarct.\", \"isNormal\": false}], \"impression\": \"Small vessel disease.\"}\n```",
            "{\"diseaseCodes\": {\"primary\": [{\"code\": \"I63.9\", \"englishName\": \"Cerebral infarction\", \"priority\": \"medium\"}]}, \"recommendations\": {\"department\": \"Neurology\"}",
        ])
        .await;
        let config = Config {
            openai_base_url: base_url,
            openai_api_key: Some("test-key".to_string()),
            ..small_config()
        };
        let llm = LlmClient::new(&config, "test-key".to_string()).unwrap();
        let app = router(state(config, Some(llm)));

        let response = app
            .oneshot(analyze_request(&[
                ("patientId", None, b"00002448".as_slice()),
                ("examDate", None, b"2024-05-01".as_slice()),
                ("file", Some("scan.png"), PNG_BYTES),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["examInfo"]["examType"], "Brain MRI");
        assert_eq!(body["examInfo"]["examDate"], "2024-05-01");
        assert_eq!(body["patientInfo"]["patientId"], "00002448");
        assert_eq!(body["impression"]["summary"], "Small vessel disease.");
        assert_eq!(body["diseaseCodes"]["primary"][0]["code"], "I63.9");
        assert_eq!(body["diseaseCodes"]["primary"][0]["priority"], "MODERATE");
        assert_eq!(body["recommendations"]["department"], "Neurology");
        assert_eq!(body["metadata"]["stagesCompleted"], 2);
        assert_eq!(body["metadata"]["mimeType"], "image/png");
        assert_eq!(body["metadata"]["fileName"], "scan.png");
        assert!(body["reportId"].as_str().unwrap().len() == 26);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let first = seen[0]["messages"][1]["content"].to_string();
        assert!(first.contains("data:image/png;base64,"));
        assert!(first.contains("00002448"));
        assert!(!seen[1].to_string().contains("base64"));
    }

    #[tokio::test]
    async fn test_api_is_rate_limited_but_health_is_not() {
        let config = Config {
            rate_limit_per_minute: 1,
            ..small_config()
        };
        let app = router(state(config, None));

        let first = app
            .clone()
            .oneshot(json_request("/api/generate-pdf", json!({})))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::BAD_REQUEST);

        let second = app
            .clone()
            .oneshot(json_request("/api/generate-pdf", json!({})))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));

        let health = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_export_text() {
        let app = router(state(Config::default(), None));
        let response = app
            .oneshot(json_request(
                "/api/export/txt",
                json!({
                    "fileName": "brain mri",
                    "analysisResult": {
                        "reportId": "01HZX3",
                        "findings": [{ "category": "Parenchyma", "description": "Lacune." }]
                    }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"brain_mri.txt\""
        );
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let text = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(text.contains("1. Parenchyma"));
    }

    #[tokio::test]
    async fn test_export_pdf_and_legacy_alias() {
        let app = router(state(Config::default(), None));
        let payload = json!({ "analysisResult": { "reportId": "01HZX3" } });

        for uri in ["/api/export/pdf", "/api/generate-pdf"] {
            let response = app
                .clone()
                .oneshot(json_request(uri, payload.clone()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
            assert!(body_bytes(response).await.starts_with(b"%PDF"));
        }
    }

    #[tokio::test]
    async fn test_export_errors() {
        let app = router(state(Config::default(), None));

        let response = app
            .clone()
            .oneshot(json_request("/api/export/docx", json!({ "analysisResult": {} })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "UNSUPPORTED_FORMAT");

        let response = app
            .oneshot(json_request("/api/export/xlsx", json!({ "fileName": "x" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "MISSING_ANALYSIS");
    }
}
