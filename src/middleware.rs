use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};
use tower_http::cors::CorsLayer;

pub type IpRateLimiter = Arc<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>;

/// Rate limiter configuration trait for type-safe middleware
pub trait RateLimitConfig {
    fn quota() -> Quota;
    fn name() -> &'static str;
}

/// Read endpoints: 1000 requests per minute per IP.
pub struct ApiRateLimit;

impl RateLimitConfig for ApiRateLimit {
    fn quota() -> Quota {
        Quota::per_minute(NonZeroU32::new(1000).unwrap())
    }

    fn name() -> &'static str {
        "API"
    }
}

/// Upload endpoint: 60 requests per minute per IP.
pub struct UploadRateLimit;

impl RateLimitConfig for UploadRateLimit {
    fn quota() -> Quota {
        Quota::per_minute(NonZeroU32::new(60).unwrap())
    }

    fn name() -> &'static str {
        "Upload"
    }
}

/// Admin endpoints: 50 requests per minute per IP.
pub struct StrictRateLimit;

impl RateLimitConfig for StrictRateLimit {
    fn quota() -> Quota {
        Quota::per_minute(NonZeroU32::new(50).unwrap())
    }

    fn name() -> &'static str {
        "Strict"
    }
}

/// Type-safe rate limiting middleware keyed by client IP.
pub async fn rate_limit_middleware<T: RateLimitConfig>(
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    use std::sync::OnceLock;
    static API_LIMITER: OnceLock<IpRateLimiter> = OnceLock::new();
    static UPLOAD_LIMITER: OnceLock<IpRateLimiter> = OnceLock::new();
    static STRICT_LIMITER: OnceLock<IpRateLimiter> = OnceLock::new();

    let limiter = match T::name() {
        "API" => API_LIMITER.get_or_init(|| Arc::new(RateLimiter::keyed(T::quota()))),
        "Upload" => UPLOAD_LIMITER.get_or_init(|| Arc::new(RateLimiter::keyed(T::quota()))),
        _ => STRICT_LIMITER.get_or_init(|| Arc::new(RateLimiter::keyed(T::quota()))),
    };

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match limiter.check_key(&ip) {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("{} rate limit exceeded for {}", T::name(), ip);
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
    }
}

/// Permissive CORS for the public read API.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}
