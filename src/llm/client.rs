// LLM client - OpenAI-compatible chat completions with image/PDF input

use std::future::Future;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response contained no message content")]
    EmptyResponse,
}

/// A file sent alongside the prompt
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime_type: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

impl Attachment {
    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }

    fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }
}

/// One chat completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub text: String,
    pub attachment: Option<Attachment>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Anything that can turn a prompt (plus optional file) into completion text
pub trait LlmProvider: Send + Sync {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Model name recorded in result metadata
    fn model_name(&self) -> &str;
}

pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;

        tracing::info!(
            "LLM client created for {} (model {})",
            config.openai_base_url,
            config.model
        );

        Ok(Self {
            client,
            api_key,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

impl LlmProvider for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = build_request_body(&self.model, request);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Status { status, body });
        }

        let json: Value = response.json().await?;
        extract_content(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the chat completions body. PDFs go as a `file` part, images as an
/// `image_url` data URL.
pub fn build_request_body(model: &str, request: &CompletionRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }

    let mut content = vec![json!({ "type": "text", "text": request.text })];
    if let Some(attachment) = &request.attachment {
        if attachment.is_pdf() {
            content.push(json!({
                "type": "file",
                "file": {
                    "filename": attachment.file_name,
                    "file_data": attachment.data_url()
                }
            }));
        } else {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": attachment.data_url() }
            }));
        }
    }
    messages.push(json!({ "role": "user", "content": content }));

    json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature
    })
}

/// Pull `choices[0].message.content` out of a completion response
pub fn extract_content(json: &Value) -> Result<String, LlmError> {
    let choice = json.get("choices").and_then(|c| c.get(0));

    if let Some(reason) = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|r| r.as_str())
    {
        if reason == "length" {
            tracing::warn!("LLM response hit max_tokens - output is truncated");
        }
    }

    choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.trim().is_empty())
        .map(|c| c.to_string())
        .ok_or(LlmError::EmptyResponse)
}
