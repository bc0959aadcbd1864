// Sliding-window rate limiter keyed by client address

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::AppState;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);
/// Sweep idle clients once the table grows past this
const SWEEP_THRESHOLD: usize = 1024;

pub struct RateLimiter {
    per_minute: u32,
    per_hour: u32,
    hits: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            per_minute,
            per_hour,
            hits: HashMap::new(),
        }
    }

    /// Record a request from `key` at `now`. Returns the number of seconds
    /// to wait when either window is full; rejected requests are not counted.
    pub fn check(&mut self, key: &str, now: Instant) -> Result<(), u64> {
        if self.hits.len() > SWEEP_THRESHOLD {
            self.hits.retain(|_, hits| {
                hits.back()
                    .map(|t| now.duration_since(*t) < HOUR)
                    .unwrap_or(false)
            });
        }

        let hits = self.hits.entry(key.to_string()).or_default();
        while hits
            .front()
            .map(|t| now.duration_since(*t) >= HOUR)
            .unwrap_or(false)
        {
            hits.pop_front();
        }

        if hits.len() >= self.per_hour as usize {
            if let Some(oldest) = hits.front() {
                return Err(retry_after(HOUR, now.duration_since(*oldest)));
            }
        }

        let in_last_minute: Vec<&Instant> = hits
            .iter()
            .filter(|t| now.duration_since(**t) < MINUTE)
            .collect();
        if in_last_minute.len() >= self.per_minute as usize {
            if let Some(oldest) = in_last_minute.first() {
                return Err(retry_after(MINUTE, now.duration_since(**oldest)));
            }
        }

        hits.push_back(now);
        Ok(())
    }
}

fn retry_after(window: Duration, elapsed: Duration) -> u64 {
    window.saturating_sub(elapsed).as_secs().max(1)
}

/// First X-Forwarded-For hop, else the peer address, else "anonymous"
pub fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Axum middleware applied to the /api routes
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    let verdict = state.rate_limiter.lock().await.check(&key, Instant::now());

    match verdict {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!("Rate limit exceeded for {} - retry after {}s", key, retry_after);
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}
