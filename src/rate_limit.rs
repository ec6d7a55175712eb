//! Per-client sliding-window rate limiting for the `/api/*` surface.
//!
//! A sliding log gives tight admission at window boundaries, unlike fixed
//! counters which admit bursts of twice the limit across a boundary. Memory
//! is O(requests-per-window) per identity, which is fine for the small
//! limits involved; idle buckets are swept to stay bounded under identity
//! churn.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// Buckets idle for this many windows are dropped during a sweep.
const IDLE_RETENTION: u32 = 5;

/// The outcome of an admission check. Never an error: a limiter fault would
/// be worse than letting a request through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Rejected { retry_after: u64 },
}

struct Buckets {
    log: HashMap<String, Vec<Instant>>,
    last_sweep: Instant,
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        RateLimiter {
            max_requests,
            window,
            buckets: Mutex::new(Buckets {
                log: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Admits or rejects one request from `identity` at instant `now`.
    ///
    /// Pruning and insertion happen under a single lock acquisition, so
    /// concurrent requests from the same identity cannot both sneak past the
    /// limit. The lock is never held across an await point.
    pub fn admit(&self, identity: &str, now: Instant) -> Decision {
        let mut buckets = self.buckets.lock().unwrap();

        if now.duration_since(buckets.last_sweep) >= SWEEP_INTERVAL {
            buckets.last_sweep = now;
            let horizon = self.window * IDLE_RETENTION;
            buckets
                .log
                .retain(|_, stamps| matches!(stamps.last(), Some(t) if now.duration_since(*t) < horizon));
        }

        let window = self.window;
        let stamps = buckets.log.entry(identity.to_string()).or_default();
        stamps.retain(|t| now.duration_since(*t) < window);

        if (stamps.len() as u32) < self.max_requests {
            stamps.push(now);
            Decision::Allowed {
                remaining: self.max_requests - stamps.len() as u32,
            }
        } else {
            // retain keeps arrival order, so the front is the oldest stamp
            // still inside the window.
            let elapsed = now.duration_since(stamps[0]);
            let retry_after = window.saturating_sub(elapsed).as_secs() + 1;
            Decision::Rejected { retry_after }
        }
    }
}

/// Resolves the client identity: proxy headers first, then the peer address.
fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Axum middleware applying the limiter to `/api/*` paths only.
/// Health checks and anything outside the API surface pass straight through.
pub async fn enforce(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    if !request.uri().path().starts_with("/api/") {
        return next.run(request).await;
    }

    let identity = client_identity(request.headers(), connect_info.map(|ConnectInfo(addr)| addr));

    match state.limiter.admit(&identity, Instant::now()) {
        Decision::Rejected { retry_after } => {
            tracing::warn!("Rate limit exceeded for {}", identity);
            AppError::RateLimited {
                retry_after,
                limit: state.limiter.limit(),
            }
            .into_response()
        }
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(state.limiter.limit()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(30, Duration::from_secs(60));
        let base = Instant::now();

        for i in 0..30 {
            let now = base + Duration::from_millis(i * 300);
            assert!(
                matches!(limiter.admit("1.2.3.4", now), Decision::Allowed { .. }),
                "request {} should be admitted",
                i + 1
            );
        }

        // 31 requests in 10 seconds: the 31st is rejected with a positive
        // retry-after no longer than the window.
        match limiter.admit("1.2.3.4", base + Duration::from_secs(10)) {
            Decision::Rejected { retry_after } => {
                assert!(retry_after >= 1);
                assert!(retry_after <= 60);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn count_resets_after_the_window_elapses() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let base = Instant::now();

        assert!(matches!(limiter.admit("a", base), Decision::Allowed { .. }));
        assert!(matches!(limiter.admit("a", base + Duration::from_secs(1)), Decision::Allowed { .. }));
        assert!(matches!(limiter.admit("a", base + Duration::from_secs(2)), Decision::Rejected { .. }));

        // A full window with no traffic clears the log regardless of the
        // earlier rejection.
        assert!(matches!(
            limiter.admit("a", base + Duration::from_secs(62)),
            Decision::Allowed { .. }
        ));
    }

    #[test]
    fn window_slides_rather_than_resetting_in_steps() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let base = Instant::now();

        assert!(matches!(limiter.admit("a", base), Decision::Allowed { .. }));
        assert!(matches!(limiter.admit("a", base + Duration::from_secs(30)), Decision::Allowed { .. }));

        // 61s in: only the first stamp has expired, so exactly one slot opens.
        assert!(matches!(
            limiter.admit("a", base + Duration::from_secs(61)),
            Decision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.admit("a", base + Duration::from_secs(62)),
            Decision::Rejected { .. }
        ));
    }

    #[test]
    fn identities_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(matches!(limiter.admit("a", now), Decision::Allowed { .. }));
        assert!(matches!(limiter.admit("b", now), Decision::Allowed { .. }));
        assert!(matches!(limiter.admit("a", now), Decision::Rejected { .. }));
    }

    #[test]
    fn remaining_counts_down() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.admit("a", now), Decision::Allowed { remaining: 2 });
        assert_eq!(limiter.admit("a", now), Decision::Allowed { remaining: 1 });
        assert_eq!(limiter.admit("a", now), Decision::Allowed { remaining: 0 });
    }

    #[test]
    fn identity_prefers_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_identity(&headers, Some(peer)), "203.0.113.9");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
        assert_eq!(client_identity(&headers, Some(peer)), "198.51.100.4");

        assert_eq!(client_identity(&HeaderMap::new(), Some(peer)), "127.0.0.1");
        assert_eq!(client_identity(&HeaderMap::new(), None), "unknown");
    }
}
