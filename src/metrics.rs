//! Exchange metrics
//!
//! Counters and histograms for provider exchanges, recorded through the
//! `metrics` facade. Nothing is exported unless a recorder is installed;
//! with the `prometheus` feature [`init_metrics_exporter`] installs one.
//!
//! # Metrics
//!
//! - `chatrelay_requests_total`: Counter of exchanges started, by provider
//! - `chatrelay_request_duration_seconds`: Histogram of exchange latency
//! - `chatrelay_responses_total`: Counter of settled exchanges by outcome
//! - `chatrelay_errors_total`: Counter of failures by error category
//! - `chatrelay_rate_limited_total`: Counter of local rate-window rejections
//! - `chatrelay_retries_total`: Counter of retry attempts scheduled
//! - `chatrelay_active_requests`: Gauge of exchanges in flight
//!
//! # Examples
//!
//! ```
//! use chatrelay::metrics::ExchangeMetrics;
//! use chatrelay::providers::Provider;
//!
//! let metrics = ExchangeMetrics::start(Provider::Groq);
//! metrics.record_success(42);
//! ```

use crate::providers::Provider;
use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::cell::Cell;
use std::time::Instant;

/// Metrics for a single provider exchange
///
/// Uses interior mutability (Cell) so the outcome can be recorded through
/// a shared reference exactly once.
#[derive(Debug)]
pub struct ExchangeMetrics {
    provider: Provider,
    start: Instant,
    recorded: Cell<bool>,
}

impl ExchangeMetrics {
    /// Starts tracking an exchange with `provider`
    pub fn start(provider: Provider) -> Self {
        increment_counter!("chatrelay_requests_total", "provider" => provider.as_str());
        increment_gauge!("chatrelay_active_requests", 1.0, "provider" => provider.as_str());

        Self {
            provider,
            start: Instant::now(),
            recorded: Cell::new(false),
        }
    }

    /// Records a successful exchange
    ///
    /// # Arguments
    ///
    /// * `tokens` - Tokens reported by the provider (0 when unknown)
    pub fn record_success(&self, tokens: usize) {
        if self.recorded.replace(true) {
            return;
        }

        histogram!(
            "chatrelay_request_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "provider" => self.provider.as_str(),
            "outcome" => "success"
        );
        histogram!(
            "chatrelay_tokens_used",
            tokens as f64,
            "provider" => self.provider.as_str()
        );
        increment_counter!(
            "chatrelay_responses_total",
            "provider" => self.provider.as_str(),
            "outcome" => "success"
        );
        decrement_gauge!("chatrelay_active_requests", 1.0, "provider" => self.provider.as_str());
    }

    /// Records a failed exchange
    ///
    /// # Arguments
    ///
    /// * `category` - Stable error label (see `ChatRelayError::category`)
    pub fn record_error(&self, category: &'static str) {
        if self.recorded.replace(true) {
            return;
        }

        histogram!(
            "chatrelay_request_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "provider" => self.provider.as_str(),
            "outcome" => "error"
        );
        increment_counter!(
            "chatrelay_errors_total",
            "provider" => self.provider.as_str(),
            "category" => category
        );
        increment_counter!(
            "chatrelay_responses_total",
            "provider" => self.provider.as_str(),
            "outcome" => "error"
        );
        decrement_gauge!("chatrelay_active_requests", 1.0, "provider" => self.provider.as_str());
    }

    /// Provider being tracked
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Whether an outcome has been recorded
    pub fn is_recorded(&self) -> bool {
        self.recorded.get()
    }
}

impl Drop for ExchangeMetrics {
    fn drop(&mut self) {
        if !self.recorded.get() {
            decrement_gauge!(
                "chatrelay_active_requests",
                1.0,
                "provider" => self.provider.as_str()
            );
        }
    }
}

/// Counts a local rate-window rejection
pub fn record_rate_limited(provider: Provider) {
    increment_counter!("chatrelay_rate_limited_total", "provider" => provider.as_str());
}

/// Counts a scheduled retry
pub fn record_retry(provider: Provider, attempt: u32) {
    increment_counter!(
        "chatrelay_retries_total",
        "provider" => provider.as_str(),
        "attempt" => attempt.to_string()
    );
}

/// Initializes the metrics exporter for Prometheus
///
/// A no-op unless the crate is built with the `prometheus` feature.
///
/// # Examples
///
/// ```
/// use chatrelay::metrics::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
