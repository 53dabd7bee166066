//! Anthropic messages API adapter
//!
//! Anthropic carries the instructional string in a top-level `system`
//! field rather than as a message, authenticates with `x-api-key`, and
//! requires the first message to come from the user.

use crate::error::{ChatRelayError, Result};
use crate::providers::base::{NormalizedResponse, PreparedConversation, RequestParams, Role};
use crate::providers::{
    decode_body, AuthorizedTarget, Provider, ProviderAdapter, ProviderPayload, TokenUsage,
};
use serde::{Deserialize, Serialize};

/// Value of the `anthropic-version` header
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic accepts temperatures in [0, 1] only
const MAX_TEMPERATURE: f32 = 1.0;

/// Request body for `/v1/messages`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagesRequest {
    /// Model identifier
    pub model: String,
    /// Instructional string (the single system entry)
    pub system: String,
    /// Alternating user/assistant turns, ending with the current message
    pub messages: Vec<AnthropicMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

/// A single turn on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnthropicMessage {
    /// `user` or `assistant`
    pub role: String,
    /// Turn text
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

/// Adapter for api.anthropic.com
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn build_payload(
        &self,
        conversation: &PreparedConversation,
        params: &RequestParams,
    ) -> ProviderPayload {
        let messages = conversation
            .turns
            .iter()
            .skip_while(|turn| turn.role == Role::Assistant)
            .map(|turn| AnthropicMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect();

        ProviderPayload::Messages(MessagesRequest {
            model: params.model.clone(),
            system: conversation.system.clone(),
            messages,
            temperature: params.temperature.min(MAX_TEMPERATURE),
            max_tokens: params.max_tokens,
        })
    }

    fn parse_response(&self, raw_body: &str) -> Result<NormalizedResponse> {
        let response: MessagesResponse = decode_body(Provider::Anthropic, raw_body)?;

        let texts: Vec<String> = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        if texts.is_empty() {
            return Err(ChatRelayError::EmptyResponse(
                "anthropic returned no content blocks".to_string(),
            )
            .into());
        }

        Ok(NormalizedResponse {
            content: texts.join("").trim().to_string(),
            finish_reason: response.stop_reason,
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
            model: response.model.unwrap_or_default(),
        })
    }

    fn authorize(&self, endpoint: &str, auth_token: &str) -> Result<AuthorizedTarget> {
        Ok(AuthorizedTarget {
            url: endpoint.to_string(),
            headers: vec![
                ("x-api-key".to_string(), auth_token.to_string()),
                (
                    "anthropic-version".to_string(),
                    ANTHROPIC_VERSION.to_string(),
                ),
            ],
        })
    }
}
