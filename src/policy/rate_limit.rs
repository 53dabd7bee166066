//! Fixed-window rate limiting per provider
//!
//! Each provider gets a window that counts requests. Once the window is
//! `window_duration` old it restarts with a zero count. A call made while
//! the count is at the limit is rejected locally, before any network I/O,
//! and the caller is told how long until the window resets.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ChatRelayError, Result};
use crate::providers::Provider;

/// Request counter for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests admitted in the current window
    pub request_count: u32,
    /// When the current window began
    pub window_start: Instant,
    /// Requests allowed per window
    pub limit: u32,
    /// Window length
    pub window_duration: Duration,
}

impl RateWindow {
    /// A fresh window starting at `now`
    pub fn new(limit: u32, window_duration: Duration, now: Instant) -> Self {
        Self {
            request_count: 0,
            window_start: now,
            limit,
            window_duration,
        }
    }

    /// Time left in the current window as seen from `now`
    pub fn remaining(&self, now: Instant) -> Duration {
        self.window_duration
            .saturating_sub(now.saturating_duration_since(self.window_start))
    }

    /// Admit one request at `now` or report the time left in the window
    fn admit(&mut self, now: Instant) -> std::result::Result<(), Duration> {
        if now.saturating_duration_since(self.window_start) >= self.window_duration {
            self.request_count = 0;
            self.window_start = now;
        }

        if self.request_count >= self.limit {
            return Err(self.remaining(now));
        }

        self.request_count += 1;
        Ok(())
    }
}

/// Per-provider fixed-window limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limits: HashMap<Provider, u32>,
    window_duration: Duration,
    windows: HashMap<Provider, RateWindow>,
}

impl RateLimiter {
    /// Create a limiter with explicit limits
    ///
    /// Providers missing from `limits` use their built-in default.
    pub fn new(limits: HashMap<Provider, u32>, window_duration: Duration) -> Self {
        Self {
            limits,
            window_duration,
            windows: HashMap::new(),
        }
    }

    /// Requests allowed per window for `provider`
    pub fn limit_for(&self, provider: Provider) -> u32 {
        self.limits
            .get(&provider)
            .copied()
            .unwrap_or_else(|| provider.default_rate_limit())
    }

    /// Admit a request to `provider` now
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` with the milliseconds left in the window
    pub fn check(&mut self, provider: Provider) -> Result<()> {
        self.check_at(provider, Instant::now())
    }

    /// Admit a request to `provider` at `now`
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` with the milliseconds left in the window
    pub fn check_at(&mut self, provider: Provider, now: Instant) -> Result<()> {
        let limit = self.limit_for(provider);
        let window_duration = self.window_duration;
        let window = self
            .windows
            .entry(provider)
            .or_insert_with(|| RateWindow::new(limit, window_duration, now));

        window.admit(now).map_err(|remaining| {
            let retry_after_ms = remaining.as_millis() as u64;
            tracing::warn!(
                "Local rate limit reached for {} ({} per {}ms); retry in {}ms",
                provider,
                window.limit,
                window.window_duration.as_millis(),
                retry_after_ms
            );
            ChatRelayError::RateLimited {
                message: format!(
                    "{} allows {} requests per {}s; retry in {}ms",
                    provider,
                    window.limit,
                    window.window_duration.as_secs(),
                    retry_after_ms
                ),
                retry_after_ms: Some(retry_after_ms),
            }
            .into()
        })
    }

    /// Current window for `provider`, if one has been opened
    pub fn window(&self, provider: Provider) -> Option<&RateWindow> {
        self.windows.get(&provider)
    }
}
