// Middleware - CORS and per-client rate limiting

pub mod cors;
pub mod rate;

pub use cors::cors_layer;
pub use rate::{rate_limit, RateLimiter};
