//! Per-client throttling of payment requirement issuance.
//!
//! Only requests without a proof are counted. A limiter exists to blunt
//! abuse of the 402 path and never participates in the admit/reject
//! decision of a proof.

use async_trait::async_trait;
use dashmap::DashMap;
use http::HeaderMap;
use http::header::HeaderName;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Limited { retry_after: Duration },
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, client_key: &str) -> RateDecision;
}

/// Where the per-client rate limit key comes from.
///
/// Every variant reads request headers, which a client can set freely. The
/// key is only as trustworthy as the proxy in front of the gateway: it must
/// strip or overwrite the headers the chosen variant reads. Without such a
/// proxy a client can rotate keys at will and escape the limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClientKeySource {
    /// First `X-Forwarded-For` hop, then `X-Real-IP`. Suits a proxy that
    /// overwrites both headers.
    #[default]
    ForwardedHeaders,
    /// The `X-Forwarded-For` entry added by the outermost of
    /// `trusted_proxies` appending proxies, counted from the right.
    TrustedProxies(usize),
    /// A single header set by the edge proxy, such as `CF-Connecting-IP`.
    Header(HeaderName),
}

impl ClientKeySource {
    pub const ANONYMOUS: &'static str = "anonymous";

    /// Identifies the caller, falling back to the shared
    /// [`ANONYMOUS`](Self::ANONYMOUS) bucket.
    pub fn key_of(&self, headers: &HeaderMap) -> String {
        let key = match self {
            ClientKeySource::ForwardedHeaders => forwarded_hops(headers)
                .next()
                .or_else(|| header_value(headers, &X_REAL_IP)),
            ClientKeySource::TrustedProxies(count) => {
                let hops: Vec<&str> = forwarded_hops(headers).collect();
                count
                    .checked_sub(1)
                    .and_then(|skip| hops.len().checked_sub(skip + 1))
                    .and_then(|index| hops.get(index).copied())
            }
            ClientKeySource::Header(name) => header_value(headers, name),
        };
        key.unwrap_or(Self::ANONYMOUS).to_string()
    }
}

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

fn header_value<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `X-Forwarded-For` entries across all header lines, left to right.
fn forwarded_hops(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Counts requests per client in fixed windows.
///
/// Windows that have run out are swept every
/// [`SWEEP_EVERY`](Self::SWEEP_EVERY) checks, so the table holds roughly the
/// clients seen during the last window.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    window: Duration,
    max_requests: u32,
    windows: DashMap<String, Window>,
    checks: AtomicUsize,
}

impl FixedWindowRateLimiter {
    pub const SWEEP_EVERY: usize = 1024;

    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            windows: DashMap::new(),
            checks: AtomicUsize::new(0),
        }
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drops every window that has run out by `now`.
    pub fn purge_expired_at(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started_at) < self.window);
    }

    fn check_at(&self, client_key: &str, now: Instant) -> RateDecision {
        let decision = self.count_at(client_key, now);
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % Self::SWEEP_EVERY == 0 {
            self.purge_expired_at(now);
        }
        decision
    }

    fn count_at(&self, client_key: &str, now: Instant) -> RateDecision {
        let mut entry = self
            .windows
            .entry(client_key.to_string())
            .or_insert(Window {
                started_at: now,
                count: 0,
            });
        let elapsed = now.saturating_duration_since(entry.started_at);
        if elapsed >= self.window {
            *entry = Window {
                started_at: now,
                count: 0,
            };
        }
        if entry.count >= self.max_requests {
            let retry_after = self
                .window
                .saturating_sub(now.saturating_duration_since(entry.started_at));
            return RateDecision::Limited { retry_after };
        }
        entry.count += 1;
        RateDecision::Allow
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn check(&self, client_key: &str) -> RateDecision {
        self.check_at(client_key, Instant::now())
    }
}
