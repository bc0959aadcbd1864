// Configuration - Environment variables
// Loaded once at startup, shared through AppState

use std::env;

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// OpenAI API key for vision calls
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API (no trailing /chat/completions)
    pub openai_base_url: String,
    /// Vision model name
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request timeout for a single LLM call
    pub llm_timeout_secs: u64,
    /// Extra attempts for a stage whose output could not be repaired
    pub parse_retries: u32,
    /// Upload limit in megabytes
    pub max_upload_mb: usize,
    /// Exact CORS origins; empty means any origin
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub rate_limit_per_hour: u32,
    /// Language the model writes explanations in
    pub report_language: String,
    /// Log file path (stdout is always on)
    pub log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 16000,
            temperature: 0.3,
            llm_timeout_secs: 180,
            parse_retries: 1,
            max_upload_mb: 10,
            allowed_origins: Vec::new(),
            rate_limit_per_minute: 10,
            rate_limit_per_hour: 100,
            report_language: "English".to_string(),
            log_file: "/tmp/medical-report-analyzer.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parse_var("PORT").unwrap_or(defaults.port),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            model: env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            max_tokens: parse_var("LLM_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            temperature: parse_var("LLM_TEMPERATURE").unwrap_or(defaults.temperature),
            llm_timeout_secs: parse_var("LLM_TIMEOUT_SECS").unwrap_or(defaults.llm_timeout_secs),
            parse_retries: parse_var("LLM_PARSE_RETRIES").unwrap_or(defaults.parse_retries),
            max_upload_mb: parse_var("MAX_UPLOAD_MB").unwrap_or(defaults.max_upload_mb),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            rate_limit_per_minute: parse_var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.rate_limit_per_minute),
            rate_limit_per_hour: parse_var("RATE_LIMIT_PER_HOUR")
                .unwrap_or(defaults.rate_limit_per_hour),
            report_language: env::var("REPORT_LANGUAGE").unwrap_or(defaults.report_language),
            log_file: env::var("LOG_FILE").unwrap_or(defaults.log_file),
        }
    }

    /// Validate configuration. Missing optional keys only warn.
    pub fn validate(&self) -> Result<(), String> {
        if self.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set - /api/analyze will return 503");
        }
        if self.allowed_origins.is_empty() {
            tracing::warn!("ALLOWED_ORIGINS not set - CORS allows any origin");
        }
        if self.max_upload_mb == 0 {
            return Err("MAX_UPLOAD_MB must be greater than 0".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "LLM_TEMPERATURE must be between 0 and 2, got {}",
                self.temperature
            ));
        }
        if self.rate_limit_per_minute == 0 || self.rate_limit_per_hour == 0 {
            return Err("rate limits must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Upload limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Split a comma-separated origin list. "*" anywhere means any origin.
pub fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if origins.iter().any(|o| o == "*") {
        return Vec::new();
    }
    origins
}
