use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::AppError;
use crate::state::AppState;

/// Requests per window, plus burst allowance.
const CAPACITY: u32 = 60 + 10;
const WINDOW: Duration = Duration::from_secs(60);

/// Per-key token bucket.
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    remaining: u32,
    last_refill: Instant,
}

impl RateLimitBucket {
    pub fn new(now: Instant) -> Self {
        Self {
            remaining: CAPACITY,
            last_refill: now,
        }
    }

    /// Take one token. `Err` carries the seconds until the caller may retry.
    fn take(&mut self, now: Instant) -> Result<u32, u64> {
        let elapsed = now.duration_since(self.last_refill);
        if elapsed >= WINDOW {
            self.remaining = CAPACITY;
            self.last_refill = now;
        } else if elapsed.as_secs() > 0 {
            let refill = (elapsed.as_secs_f64() / WINDOW.as_secs_f64() * CAPACITY as f64) as u32;
            self.remaining = (self.remaining + refill).min(CAPACITY);
            self.last_refill = now;
        }

        if self.remaining == 0 {
            let wait = WINDOW.saturating_sub(now.duration_since(self.last_refill));
            return Err(wait.as_secs().max(1));
        }
        self.remaining -= 1;
        Ok(self.remaining)
    }
}

fn bucket_key(req: &Request) -> String {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|auth| format!("auth:{:x}", Sha256::digest(auth.as_bytes())))
        .unwrap_or_else(|| "anon".to_string())
}

/// Token-bucket rate limiter keyed by the hashed Authorization header.
/// Unauthenticated callers share one bucket.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let now = Instant::now();
    let taken = state
        .rate_limits
        .entry(bucket_key(&req))
        .or_insert_with(|| RateLimitBucket::new(now))
        .take(now);

    let remaining = match taken {
        Ok(remaining) => remaining,
        Err(retry_after) => return AppError::RateLimited { retry_after }.into_response(),
    };

    let mut response = next.run(req).await;
    let reset = chrono::Utc::now().timestamp() + WINDOW.as_secs() as i64;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(CAPACITY));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset));
    response
}
