// Medical Report Analyzer Backend - Rust
// Upload a radiology report, get structured findings, codes and exports back

use std::fs::OpenOptions;
use std::io::LineWriter;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Custom time formatter: [HH:mm:ss] [analyzer]
#[derive(Clone)]
struct AnalyzerTimer;

impl FormatTime for AnalyzerTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(w, "[{}] [analyzer]", now.format("%H:%M:%S"))
    }
}

mod analysis;
mod config;
mod error;
mod export;
mod llm;
mod middleware;
mod models;
mod routes;

use config::Config;
use llm::LlmClient;
use middleware::{cors_layer, RateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// None when OPENAI_API_KEY is unset; /api/analyze answers 503
    pub llm: Option<Arc<LlmClient>>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

#[tokio::main]
async fn main() {
    // Load environment variables first so LOG_FILE from .env is honoured
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // File output is best effort; stdout always works
    // LineWriter flushes after each line so logs appear immediately
    let (file_writer, _guard) = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
    {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(LineWriter::new(file));
            (Some(writer), Some(guard))
        }
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", config.log_file, e);
            (None, None)
        }
    };

    // Format: [HH:mm:ss] [analyzer] message
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medical_report_analyzer=info,tower_http=info".into()),
        )
        // Stdout layer
        .with(
            fmt::layer()
                .with_timer(AnalyzerTimer)
                .with_target(false)
                .with_level(false)
                .with_ansi(true),
        )
        // File layer (same format, no ANSI colors)
        .with(file_writer.map(|writer| {
            fmt::layer()
                .with_timer(AnalyzerTimer)
                .with_target(false)
                .with_level(false)
                .with_ansi(false)
                .with_writer(writer)
        }))
        .init();

    if let Err(e) = config.validate() {
        tracing::error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // LLM client (optional)
    let llm = match &config.openai_api_key {
        Some(key) => match LlmClient::new(&config, key.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::error!("Failed to create LLM client: {}", e);
                None
            }
        },
        None => None,
    };

    // Create app state
    let state = AppState {
        rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
            config.rate_limit_per_minute,
            config.rate_limit_per_hour,
        ))),
        llm,
        config: Arc::new(config.clone()),
    };

    let app = routes::router(state)
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        "Starting Medical Report Analyzer on {} (model {}, upload limit {} MB)",
        addr,
        config.model,
        config.max_upload_mb
    );

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
    }
}
