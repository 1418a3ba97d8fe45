//! Fixed-window request limiting per client.

use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Windows are pruned once the table grows past this many clients.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Counts requests per client id within fixed windows.
///
/// Owned by the server state and shared across requests behind an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    entries: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.max_requests)
    }

    /// Record a request from `client` and report whether it exceeds the limit.
    pub fn is_limited(&self, client: &str) -> bool {
        self.is_limited_at(client, Instant::now())
    }

    /// Same as [`is_limited`](Self::is_limited) with an explicit clock.
    pub fn is_limited_at(&self, client: &str, now: Instant) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if entries.len() > PRUNE_THRESHOLD {
            let window = self.window;
            entries.retain(|_, w| now.duration_since(w.start) <= window);
        }

        if let Some(w) = entries.get_mut(client) {
            if now.duration_since(w.start) <= self.window {
                w.count = w.count.saturating_add(1);
                return w.count > self.max_requests;
            }
        }

        entries.insert(
            client.to_string(),
            Window {
                start: now,
                count: 1,
            },
        );
        false
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or_default()
    }
}

/// Identify the caller: first `x-forwarded-for` hop, then `x-real-ip`.
pub fn client_id(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
