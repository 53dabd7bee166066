//! OpenAI-compatible chat completions adapter
//!
//! OpenAI, Groq and locally hosted servers (LM Studio, llama.cpp server,
//! vLLM) all accept the same `/v1/chat/completions` schema. They differ
//! only in authentication and in how the local server reports that it is
//! not ready.

use crate::error::{ChatRelayError, Result};
use crate::providers::base::{self, NormalizedResponse, PreparedConversation, RequestParams};
use crate::providers::{
    decode_body, AuthorizedTarget, Provider, ProviderAdapter, ProviderPayload, TokenUsage,
};
use serde::{Deserialize, Serialize};

/// API key value that means "no authentication" for the local server
pub const LOCAL_KEY_SENTINEL: &str = "local";

/// Request body for `/v1/chat/completions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    /// Model identifier
    pub model: String,
    /// System entry, history, then the current user turn
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

/// A single chat message on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: Option<usize>,
}

/// Adapter shared by every OpenAI-compatible provider
#[derive(Debug, Clone, Copy)]
pub struct OpenAiCompatibleAdapter {
    provider: Provider,
}

impl OpenAiCompatibleAdapter {
    /// Bind the adapter to one of the OpenAI-compatible providers
    pub const fn new(provider: Provider) -> Self {
        Self { provider }
    }
}

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn build_payload(
        &self,
        conversation: &PreparedConversation,
        params: &RequestParams,
    ) -> ProviderPayload {
        let mut messages = Vec::with_capacity(conversation.turns.len() + 1);
        messages.push(ChatMessage::new("system", conversation.system.clone()));
        messages.extend(
            conversation
                .turns
                .iter()
                .map(|turn| ChatMessage::new(turn.role.as_str(), turn.content.clone())),
        );

        ProviderPayload::ChatCompletion(ChatCompletionRequest {
            model: params.model.clone(),
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        })
    }

    fn parse_response(&self, raw_body: &str) -> Result<NormalizedResponse> {
        let response: ChatCompletionResponse = decode_body(self.provider, raw_body)?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            ChatRelayError::EmptyResponse(format!("{} returned no choices", self.provider))
        })?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default()
            .trim()
            .to_string();

        let usage = response.usage.map(|u| {
            let mut usage = TokenUsage::new(u.prompt_tokens, u.completion_tokens);
            if let Some(total) = u.total_tokens {
                usage.total_tokens = total;
            }
            usage
        });

        Ok(NormalizedResponse {
            content,
            finish_reason: choice.finish_reason,
            usage,
            model: response.model.unwrap_or_default(),
        })
    }

    fn map_error(&self, status: u16, body: &str) -> ChatRelayError {
        if self.provider == Provider::Local {
            match status {
                404 => {
                    return ChatRelayError::ServerUnavailable(
                        "Local server not found. Start your local model server and check the endpoint"
                            .to_string(),
                    )
                }
                503 => {
                    return ChatRelayError::ServerUnavailable(
                        "Local model is still loading; try again in a moment".to_string(),
                    )
                }
                _ => {}
            }
        }
        base::map_status(self.provider, status, body)
    }

    fn authorize(&self, endpoint: &str, auth_token: &str) -> Result<AuthorizedTarget> {
        let skip_auth = self.provider == Provider::Local
            && (auth_token.is_empty() || auth_token == LOCAL_KEY_SENTINEL);

        let headers = if skip_auth {
            Vec::new()
        } else {
            vec![(
                "Authorization".to_string(),
                format!("Bearer {}", auth_token),
            )]
        };

        Ok(AuthorizedTarget {
            url: endpoint.to_string(),
            headers,
        })
    }
}
