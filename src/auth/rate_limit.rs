use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::AppState;

const AUTH_MAX_REQUESTS: u32 = 5;
const AUTH_WINDOW: Duration = Duration::from_secs(60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Fixed-window counter per key, held in process memory.
#[derive(Clone)]
pub struct RateLimitState {
    entries: Arc<Mutex<HashMap<String, Window>>>,
    max_requests: u32,
    window: Duration,
}

struct Window {
    count: u32,
    started: Instant,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new(AUTH_MAX_REQUESTS, AUTH_WINDOW)
    }
}

impl RateLimitState {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Counts one request for `key`. `Ok(remaining)` or `Err(retry_after)`.
    pub async fn check(&self, key: &str) -> Result<u32, Duration> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(entry.started) > self.window {
            entry.count = 0;
            entry.started = now;
        }

        if entry.count >= self.max_requests {
            return Err(self
                .window
                .saturating_sub(now.duration_since(entry.started)));
        }

        entry.count += 1;
        Ok(self.max_requests - entry.count)
    }

    /// Drops windows that ended more than one window ago.
    pub async fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let keep_for = self.window * 2;
        let now = Instant::now();
        entries.retain(|_, w| now.duration_since(w.started) < keep_for);
        before - entries.len()
    }

    pub fn spawn_cleanup_worker(&self) {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let purged = limiter.cleanup().await;
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired rate limit windows");
                }
            }
        });
    }
}

/// Limits auth endpoints per client IP and path.
pub async fn rate_limit_auth(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = addr.ip().to_string();
    let path = req.uri().path().to_string();
    let key = format!("{}:{}", ip, path);

    match state.rate_limiter.check(&key).await {
        Ok(remaining) => {
            tracing::debug!(ip = %ip, path = %path, remaining, "Rate limit check passed");
            Ok(next.run(req).await)
        }
        Err(retry_after) => {
            tracing::warn!(
                ip = %ip,
                path = %path,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(AppError::RateLimited)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocks_after_limit() {
        let limiter = RateLimitState::default();

        for i in 0..AUTH_MAX_REQUESTS {
            assert_eq!(limiter.check("k").await, Ok(AUTH_MAX_REQUESTS - i - 1));
        }
        let retry_after = limiter.check("k").await.unwrap_err();
        assert!(retry_after <= AUTH_WINDOW);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimitState::new(1, AUTH_WINDOW);
        assert!(limiter.check("10.0.0.1:/api/auth/login").await.is_ok());
        assert!(limiter.check("10.0.0.1:/api/auth/login").await.is_err());
        assert!(limiter.check("10.0.0.1:/api/auth/register").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_resets_and_cleanup() {
        let limiter = RateLimitState::new(1, Duration::from_millis(20));
        assert!(limiter.check("k").await.is_ok());
        assert!(limiter.check("k").await.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check("k").await.is_ok());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.cleanup().await, 1);
    }
}
