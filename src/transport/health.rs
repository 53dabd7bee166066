//! Provider health checks
//!
//! The local server is probed with `GET {origin}/v1/models`. Remote
//! vendors are only checked for a resolvable endpoint, since probing them
//! would spend quota. Results are cached per provider for a fixed TTL.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::Config;
use crate::providers::Provider;
use crate::transport::Transport;

/// Timeout for a single health probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of a health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Provider checked
    pub provider: Provider,
    /// Whether the provider looks usable
    pub healthy: bool,
    /// Resolved endpoint, if any
    pub endpoint: Option<String>,
    /// Human-readable explanation
    pub detail: String,
}

/// Cached provider health checker
#[derive(Debug, Clone)]
pub struct HealthChecker {
    transport: Arc<dyn Transport>,
    ttl: Duration,
    cache: Arc<RwLock<HashMap<Provider, (HealthStatus, Instant)>>>,
}

impl HealthChecker {
    /// Create a checker whose results stay valid for `ttl`
    pub fn new(transport: Arc<dyn Transport>, ttl: Duration) -> Self {
        Self {
            transport,
            ttl,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check `provider`, reusing a cached result when still fresh
    pub async fn check(&self, config: &Config, provider: Provider) -> HealthStatus {
        if let Ok(cache) = self.cache.read() {
            if let Some((status, checked_at)) = cache.get(&provider) {
                if checked_at.elapsed() < self.ttl {
                    tracing::debug!("Using cached health for {}", provider);
                    return status.clone();
                }
            }
        }

        let status = self.probe(config, provider).await;

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(provider, (status.clone(), Instant::now()));
        }

        status
    }

    /// Drop every cached result
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
            tracing::debug!("Health cache invalidated");
        }
    }

    async fn probe(&self, config: &Config, provider: Provider) -> HealthStatus {
        let model = config.resolve_model(provider);
        let endpoint = match config.resolve_endpoint(provider, &model) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                return HealthStatus {
                    provider,
                    healthy: false,
                    endpoint: None,
                    detail: e.to_string(),
                }
            }
        };

        if provider != Provider::Local {
            return HealthStatus {
                provider,
                healthy: true,
                endpoint: Some(endpoint),
                detail: "endpoint configured".to_string(),
            };
        }

        let probe_url = match models_url(&endpoint) {
            Some(url) => url,
            None => {
                return HealthStatus {
                    provider,
                    healthy: false,
                    endpoint: Some(endpoint.clone()),
                    detail: format!("cannot derive a probe URL from {}", endpoint),
                }
            }
        };

        tracing::debug!("Probing local server at {}", probe_url);
        let outcome = tokio::time::timeout(PROBE_TIMEOUT, self.transport.get(&probe_url, &[])).await;

        let (healthy, detail) = match outcome {
            Err(_) => (
                false,
                format!("no answer within {}ms", PROBE_TIMEOUT.as_millis()),
            ),
            Ok(Err(e)) => (false, e.to_string()),
            Ok(Ok(reply)) if reply.is_success() => (true, "local server is up".to_string()),
            Ok(Ok(reply)) => (
                false,
                provider
                    .adapter()
                    .map_error(reply.status, &reply.body)
                    .to_string(),
            ),
        };

        HealthStatus {
            provider,
            healthy,
            endpoint: Some(endpoint),
            detail,
        }
    }
}

/// `{scheme}://{host}[:port]/v1/models` for an endpoint URL
fn models_url(endpoint: &str) -> Option<String> {
    let url = url::Url::parse(endpoint).ok()?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(format!("{}/v1/models", origin.ascii_serialization()))
}
