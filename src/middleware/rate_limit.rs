use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header::RETRY_AFTER, HeaderName, HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::response::AppError;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

const DEFAULT_WINDOW_MS: u64 = 60_000;
const DEFAULT_MAX: u64 = 20;

/// Fixed-window limiter keyed by client ip, method and path. One instance per
/// app, wired in with `from_fn_with_state`, so two servers in one process
/// never share counters.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path != "/api" && !path.starts_with("/api/") {
        return next.run(req).await;
    }

    let key = Key {
        ip: extract_client_ip(&req).unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))),
        method: req.method().clone(),
        path: path.to_string(),
    };
    let check = limiter.check(key).await;

    if !check.allowed {
        let mut res = AppError::rate_limited("Too many requests, please try again later")
            .into_response();
        apply_rate_limit_headers(&mut res, check);
        return res;
    }

    let mut res = next.run(req).await;
    apply_rate_limit_headers(&mut res, check);
    res
}

fn apply_rate_limit_headers(res: &mut Response, check: RateLimitCheck) {
    if let Ok(value) = HeaderValue::from_str(&check.limit.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.remaining.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_REMAINING, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.reset_after_seconds.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_RESET, value.clone());
        if check.remaining == 0 {
            res.headers_mut().insert(RETRY_AFTER, value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    ip: IpAddr,
    method: Method,
    path: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max: u64,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            window_ms: env_u64("RATE_LIMIT_WINDOW_MS").unwrap_or(DEFAULT_WINDOW_MS),
            max: env_u64("RATE_LIMIT_MAX").unwrap_or(DEFAULT_MAX),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u64>().ok()
}

#[derive(Debug)]
struct RateLimiterState {
    entries: HashMap<Key, Entry>,
    last_cleanup_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    window_start_ms: u64,
    hits: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateLimitCheck {
    allowed: bool,
    limit: u64,
    remaining: u64,
    reset_after_seconds: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RateLimiterState {
                entries: HashMap::new(),
                last_cleanup_ms: now_ms(),
            }),
        }
    }

    async fn check(&self, key: Key) -> RateLimitCheck {
        let now_ms = now_ms();
        let mut state = self.state.lock().await;

        // Sweep stale windows at most once per window.
        if now_ms.saturating_sub(state.last_cleanup_ms) >= self.config.window_ms {
            let window_ms = self.config.window_ms;
            state
                .entries
                .retain(|_, entry| now_ms.saturating_sub(entry.window_start_ms) < window_ms);
            state.last_cleanup_ms = now_ms;
        }

        let entry = state.entries.entry(key).or_insert_with(|| Entry {
            window_start_ms: now_ms,
            hits: 0,
        });

        if now_ms.saturating_sub(entry.window_start_ms) >= self.config.window_ms {
            entry.window_start_ms = now_ms;
            entry.hits = 0;
        }

        entry.hits = entry.hits.saturating_add(1);
        let allowed = entry.hits <= self.config.max;
        let remaining = self
            .config
            .max
            .saturating_sub(entry.hits)
            .min(self.config.max);
        let reset_after_ms = self
            .config
            .window_ms
            .saturating_sub(now_ms.saturating_sub(entry.window_start_ms));
        let reset_after_seconds = (reset_after_ms + 999) / 1000;

        RateLimitCheck {
            allowed,
            limit: self.config.max,
            remaining: if allowed { remaining } else { 0 },
            reset_after_seconds,
        }
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Best-available client ip: the forwarding header when the deployment says
/// to trust it, the socket peer otherwise.
pub fn extract_client_ip(req: &Request<Body>) -> Option<IpAddr> {
    if trust_proxy_enabled() {
        if let Some(ip) = extract_x_forwarded_for(req) {
            return Some(ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn trust_proxy_enabled() -> bool {
    let value = std::env::var("TRUST_PROXY").ok();
    let Some(value) = value else { return false };
    let normalized = value.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return false;
    }
    !matches!(normalized.as_str(), "0" | "false")
}

fn extract_x_forwarded_for(req: &Request<Body>) -> Option<IpAddr> {
    let raw = req
        .headers()
        .get(HeaderName::from_static("x-forwarded-for"))?
        .to_str()
        .ok()?;
    let first = raw.split(',').next()?.trim();
    first.parse::<IpAddr>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> Key {
        Key {
            ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)),
            method: Method::POST,
            path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn counts_per_key_within_the_window() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window_ms: 60_000,
            max: 2,
        });

        assert!(limiter.check(key("/api/transfer/create")).await.allowed);
        assert!(limiter.check(key("/api/transfer/create")).await.allowed);
        let third = limiter.check(key("/api/transfer/create")).await;
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);

        // A different path is a different counter.
        assert!(limiter.check(key("/api/transfer/redeem")).await.allowed);
    }

    #[tokio::test]
    async fn separate_limiters_do_not_share_state() {
        let config = RateLimitConfig {
            window_ms: 60_000,
            max: 1,
        };
        let a = RateLimiter::new(config);
        let b = RateLimiter::new(config);

        assert!(a.check(key("/api/transfer/create")).await.allowed);
        assert!(!a.check(key("/api/transfer/create")).await.allowed);
        assert!(b.check(key("/api/transfer/create")).await.allowed);
    }
}
