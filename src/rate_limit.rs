use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{config::RateLimitPolicy, error::AppError};

struct Bucket {
    count: u32,
    window_start: Instant,
}

/// Fixed-window limiter keyed by client address. Every route behind one
/// limiter draws from the same per-client budget.
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    message: &'static str,
    policy: RateLimitPolicy,
    buckets: Arc<DashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, policy: RateLimitPolicy, message: &'static str) -> Self {
        Self {
            name,
            message,
            policy,
            buckets: Arc::new(DashMap::new()),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.policy.window_secs)
    }

    /// Count one hit for `key`. `Err(secs)` carries the wait until the
    /// window resets.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window() {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.policy.max {
            let elapsed = now.duration_since(entry.window_start);
            let wait = self.window().saturating_sub(elapsed).as_secs().max(1);
            return Err(wait);
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop buckets whose window has run out. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.window();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.duration_since(b.window_start) < window);
        before.saturating_sub(self.buckets.len())
    }
}

/// Evict stale buckets once per window for the life of the runtime.
pub fn spawn_sweeper(limiter: RateLimiter) -> JoinHandle<()> {
    let every = limiter.window().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep_expired();
            debug!(limiter = limiter.name, removed, "rate limit buckets cleaned");
        }
    })
}

fn client_key(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    forwarded
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".into())
}

pub async fn limit(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&req);

    if let Err(retry_after_secs) = limiter.check(&key) {
        warn!(
            target: "security_event",
            event = "RATE_LIMIT_EXCEEDED",
            limiter = limiter.name,
            client = %key,
            path = req.uri().path(),
            retry_after_secs,
            "request rejected"
        );
        return Err(AppError::RateLimited {
            retry_after_secs,
            message: limiter.message,
        });
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new("test", RateLimitPolicy { max, window_secs }, "slow down")
    }

    #[test]
    fn allows_up_to_max_then_rejects() {
        let l = limiter(3, 60);
        for _ in 0..3 {
            assert!(l.check("1.2.3.4").is_ok());
        }
        let wait = l.check("1.2.3.4").unwrap_err();
        assert!(wait >= 1 && wait <= 60);
    }

    #[test]
    fn keys_are_independent() {
        let l = limiter(1, 60);
        assert!(l.check("a").is_ok());
        assert!(l.check("a").is_err());
        assert!(l.check("b").is_ok());
    }

    #[test]
    fn window_resets() {
        let l = limiter(1, 0);
        assert!(l.check("a").is_ok());
        assert!(l.check("a").is_ok());
    }

    #[test]
    fn sweep_drops_only_elapsed_buckets() {
        let stale = limiter(5, 0);
        stale.check("a").unwrap();
        stale.check("b").unwrap();
        assert_eq!(stale.sweep_expired(), 2);

        let live = limiter(5, 60);
        live.check("a").unwrap();
        assert_eq!(live.sweep_expired(), 0);
        // the budget survives the sweep
        for _ in 0..4 {
            live.check("a").unwrap();
        }
        assert!(live.check("a").is_err());
    }

    #[test]
    fn forwarded_for_wins_over_peer() {
        let req = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&req), "203.0.113.9");

        let bare = axum::http::Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_key(&bare), "unknown");
    }
}
