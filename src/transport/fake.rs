//! Scripted in-process transport for unit tests
//!
//! Replies are queued up front and handed out in order, one per call.
//! Every request that actually reaches the transport is recorded so tests
//! can assert on URLs, headers and bodies.
//!
//! ```text
//! push_reply(200, body) -> queue -> post() pops -> RawReply
//!                                   post() records -> requests()
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ChatRelayError, Result};
use crate::transport::{OutboundRequest, RawReply, Transport};

#[derive(Debug)]
enum ScriptedReply {
    Reply {
        delay: Duration,
        status: u16,
        body: String,
    },
    NetworkError(String),
}

/// In-process fake transport
///
/// Cloning shares the queue and the request log.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    requests: Arc<Mutex<Vec<OutboundRequest>>>,
    probes: Arc<Mutex<Vec<String>>>,
}

impl FakeTransport {
    /// Creates a fake with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an immediate reply
    pub fn push_reply(&self, status: u16, body: &str) {
        self.push_delayed_reply(Duration::ZERO, status, body);
    }

    /// Queues a reply that settles after `delay`
    pub fn push_delayed_reply(&self, delay: Duration, status: u16, body: &str) {
        self.replies
            .lock()
            .expect("fake transport lock poisoned")
            .push_back(ScriptedReply::Reply {
                delay,
                status,
                body: body.to_string(),
            });
    }

    /// Queues a connection failure
    pub fn push_network_error(&self, message: &str) {
        self.replies
            .lock()
            .expect("fake transport lock poisoned")
            .push_back(ScriptedReply::NetworkError(message.to_string()));
    }

    /// Requests that reached the transport, in order
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests
            .lock()
            .expect("fake transport lock poisoned")
            .clone()
    }

    /// URLs probed with GET, in order
    pub fn probes(&self) -> Vec<String> {
        self.probes
            .lock()
            .expect("fake transport lock poisoned")
            .clone()
    }

    async fn next_reply(&self) -> Result<RawReply> {
        let scripted = self
            .replies
            .lock()
            .expect("fake transport lock poisoned")
            .pop_front();

        match scripted {
            Some(ScriptedReply::Reply {
                delay,
                status,
                body,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(RawReply { status, body })
            }
            Some(ScriptedReply::NetworkError(message)) => {
                Err(ChatRelayError::Network(message).into())
            }
            None => Err(ChatRelayError::Network("no scripted reply left".to_string()).into()),
        }
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn post(&self, request: OutboundRequest) -> Result<RawReply> {
        self.requests
            .lock()
            .expect("fake transport lock poisoned")
            .push(request);
        self.next_reply().await
    }

    async fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<RawReply> {
        self.probes
            .lock()
            .expect("fake transport lock poisoned")
            .push(url.to_string());
        self.next_reply().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> OutboundRequest {
        OutboundRequest {
            url: "http://fake".to_string(),
            headers: Vec::new(),
            body: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_replies_are_served_in_order() {
        let transport = FakeTransport::new();
        transport.push_reply(500, "first");
        transport.push_reply(200, "second");

        assert_eq!(transport.post(request()).await.unwrap().status, 500);
        assert_eq!(transport.post(request()).await.unwrap().body, "second");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_script_is_network_error() {
        let transport = FakeTransport::new();
        let err = transport.post(request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::Network(_))
        ));
    }
}
