//! Rate limiting middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

use super::error::ApiError;

/// Quota used when the configured one is zero.
const DEFAULT_RPM: NonZeroU32 = NonZeroU32::MIN.saturating_add(59);

/// Shared rate limiter type.
pub type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a rate limiter with the specified RPM quota.
pub fn create_rate_limiter(requests_per_minute: u32) -> SharedRateLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(DEFAULT_RPM));
    Arc::new(RateLimiter::direct(quota))
}

/// Rate limiting middleware.
///
/// Sync requests hit the chain provider, so the limit is global rather
/// than per client.
pub async fn rate_limit(
    limiter: SharedRateLimiter,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match limiter.check() {
        Ok(()) => Ok(next.run(request).await),
        Err(_) => {
            debug!(uri = %request.uri(), "Request rejected by rate limiter");
            Err(ApiError::RateLimitExceeded)
        }
    }
}
