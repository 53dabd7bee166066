//! reqwest-backed transport
//!
//! Each call is an independent request. Timeouts are enforced by the
//! caller's race in [`crate::transport::send`], so the client itself only
//! bounds connection setup.

use std::time::Duration;

use crate::error::{ChatRelayError, Result};
use crate::transport::{OutboundRequest, RawReply, Transport};

/// Upper bound on TCP/TLS connection setup
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Construct a transport with the default client settings
    ///
    /// # Errors
    ///
    /// Returns `Http` if the TLS backend cannot be initialised
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ChatRelayError::from)?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn into_reply(response: reqwest::Response) -> Result<RawReply> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            ChatRelayError::Network(format!("Failed to read response body: {}", e))
        })?;
        Ok(RawReply { status, body })
    }
}

fn network_error(e: reqwest::Error) -> ChatRelayError {
    if e.is_connect() {
        ChatRelayError::Network(format!("Connection failed: {}", e))
    } else {
        ChatRelayError::Network(format!("Request failed: {}", e))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: OutboundRequest) -> Result<RawReply> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!("Request failed: {}", e);
            network_error(e)
        })?;

        Self::into_reply(response).await
    }

    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<RawReply> {
        let mut builder = self.client.get(url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(network_error)?;
        Self::into_reply(response).await
    }
}
