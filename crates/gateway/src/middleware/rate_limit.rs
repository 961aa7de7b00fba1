//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rag_common::config::RateLimitConfig;
use rag_common::errors::AppError;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter plus the configured rate, for error reporting
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

impl RateLimitState {
    /// Zero values are raised to 1 so a bad config cannot panic
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(rps);

        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps).allow_burst(burst))),
            requests_per_second: rps.get(),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    match state.limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            AppError::RateLimited { limit: state.requests_per_second }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_enforced() {
        let state = RateLimitState::from_config(&RateLimitConfig {
            requests_per_second: 1,
            burst: 2,
            enabled: true,
        });
        assert!(state.limiter.check().is_ok());
        assert!(state.limiter.check().is_ok());
        assert!(state.limiter.check().is_err());
    }

    #[test]
    fn test_zero_config_does_not_panic() {
        let state = RateLimitState::from_config(&RateLimitConfig {
            requests_per_second: 0,
            burst: 0,
            enabled: true,
        });
        assert_eq!(state.requests_per_second, 1);
        assert!(state.limiter.check().is_ok());
    }
}
