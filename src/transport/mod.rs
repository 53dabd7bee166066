//! Provider transport abstraction
//!
//! This module defines the [`Transport`] trait that issues a single HTTP
//! request and returns the raw status and body. Concrete implementations
//! live in submodules:
//!
//! - [`http::HttpTransport`] -- reqwest-backed implementation.
//! - [`fake::FakeTransport`] -- scripted in-process fake used in tests
//!   (cfg(test) only).
//!
//! [`send`] layers provider semantics on top: credentials, the timeout and
//! cancellation race, and status-code mapping.

use crate::error::{ChatRelayError, Result};
use crate::providers::{Provider, ProviderPayload};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod health;
pub mod http;

#[cfg(test)]
pub mod fake;

pub use health::{HealthChecker, HealthStatus};
pub use http::HttpTransport;

/// A fully authorized request
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Target URL, including any query-string credentials
    pub url: String,
    /// Extra headers (auth, API version)
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: serde_json::Value,
}

/// Raw reply before any interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl RawReply {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over the HTTP client
///
/// Implementations report connection failures as `Network` errors and
/// return every HTTP status, success or not, as a [`RawReply`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// POST a JSON body
    async fn post(&self, request: OutboundRequest) -> Result<RawReply>;

    /// GET `url` with `headers`, used for health probes
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<RawReply>;
}

/// Send `payload` to `provider` and return the raw 2xx body
///
/// The call races against `timeout` and `cancel`. Whichever settles first
/// decides the outcome; the losing network future is dropped, which does
/// not guarantee the request stopped server-side.
///
/// # Errors
///
/// - `Cancelled` when `cancel` fires first
/// - `Timeout` when `timeout` elapses first
/// - the adapter's mapping of a non-2xx status
/// - `Network` for connection failures
#[allow(clippy::too_many_arguments)]
pub async fn send(
    transport: &dyn Transport,
    provider: Provider,
    endpoint: &str,
    payload: &ProviderPayload,
    auth_token: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String> {
    let adapter = provider.adapter();
    let target = adapter.authorize(endpoint, auth_token)?;
    let request = OutboundRequest {
        url: target.url,
        headers: target.headers,
        body: payload.to_json()?,
    };

    tracing::debug!("Sending request to {} at {}", provider, endpoint);

    let reply = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("Request to {} cancelled", provider);
            return Err(ChatRelayError::Cancelled.into());
        }
        _ = tokio::time::sleep(timeout) => {
            let timeout_ms = timeout.as_millis() as u64;
            tracing::warn!("Request to {} timed out after {}ms", provider, timeout_ms);
            return Err(ChatRelayError::Timeout { timeout_ms }.into());
        }
        reply = transport.post(request) => reply?,
    };

    if !reply.is_success() {
        tracing::error!(
            "{} returned error {}: {}",
            provider,
            reply.status,
            reply.body
        );
        return Err(adapter.map_error(reply.status, &reply.body).into());
    }

    Ok(reply.body)
}
