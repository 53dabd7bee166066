//! Google Generative Language (`generateContent`) adapter
//!
//! Google names the assistant role `model`, moves the instructional
//! string into `systemInstruction`, and passes the API key as a `key`
//! query parameter instead of a header.

use crate::error::{ChatRelayError, Result};
use crate::providers::base::{self, NormalizedResponse, PreparedConversation, RequestParams, Role};
use crate::providers::{
    decode_body, AuthorizedTarget, Provider, ProviderAdapter, ProviderPayload, TokenUsage,
};
use serde::{Deserialize, Serialize};

/// Candidate finish reasons that mean the answer was withheld
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// Request body for `models/{model}:generateContent`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns, starting with a user turn
    pub contents: Vec<Content>,
    /// Instructional string
    pub system_instruction: SystemInstruction,
    /// Sampling settings
    pub generation_config: GenerationConfig,
}

/// One turn: `user` or `model`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// `user` or `model`
    #[serde(default)]
    pub role: String,
    /// Text parts
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A text part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Part text
    #[serde(default)]
    pub text: String,
}

/// System instruction wrapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInstruction {
    /// Instruction parts
    pub parts: Vec<Part>,
}

/// Generation settings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
    #[serde(default)]
    total_token_count: Option<usize>,
}

/// Adapter for generativelanguage.googleapis.com
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdapter;

impl GoogleAdapter {
    fn wire_role(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "model",
        }
    }
}

impl ProviderAdapter for GoogleAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn build_payload(
        &self,
        conversation: &PreparedConversation,
        params: &RequestParams,
    ) -> ProviderPayload {
        let contents = conversation
            .turns
            .iter()
            .skip_while(|turn| turn.role == Role::Assistant)
            .map(|turn| Content {
                role: Self::wire_role(turn.role).to_string(),
                parts: vec![Part {
                    text: turn.content.clone(),
                }],
            })
            .collect();

        ProviderPayload::GenerateContent(GenerateContentRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: conversation.system.clone(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            },
        })
    }

    fn parse_response(&self, raw_body: &str) -> Result<NormalizedResponse> {
        let response: GenerateContentResponse = decode_body(Provider::Google, raw_body)?;

        if let Some(reason) = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            tracing::warn!("Google blocked the prompt: {}", reason);
            return Err(ChatRelayError::SafetyBlocked(format!(
                "prompt blocked by google ({})",
                reason
            ))
            .into());
        }

        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            ChatRelayError::EmptyResponse("google returned no candidates".to_string())
        })?;

        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|reason| BLOCKING_FINISH_REASONS.contains(reason))
        {
            tracing::warn!("Google withheld the candidate: {}", reason);
            return Err(ChatRelayError::SafetyBlocked(format!(
                "response withheld by google ({})",
                reason
            ))
            .into());
        }

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ChatRelayError::EmptyResponse(
                "google returned a candidate without text".to_string(),
            )
            .into());
        }

        let usage = response.usage_metadata.map(|u| {
            let mut usage = TokenUsage::new(u.prompt_token_count, u.candidates_token_count);
            if let Some(total) = u.total_token_count {
                usage.total_tokens = total;
            }
            usage
        });

        Ok(NormalizedResponse {
            content: content.trim().to_string(),
            finish_reason: candidate.finish_reason,
            usage,
            model: response.model_version.unwrap_or_default(),
        })
    }

    fn map_error(&self, status: u16, body: &str) -> ChatRelayError {
        if status == 400 && body.contains("API key not valid") {
            return ChatRelayError::InvalidCredentials(
                "google rejected the API key".to_string(),
            );
        }
        base::map_status(Provider::Google, status, body)
    }

    fn authorize(&self, endpoint: &str, auth_token: &str) -> Result<AuthorizedTarget> {
        let mut url = url::Url::parse(endpoint).map_err(|e| {
            ChatRelayError::Configuration(format!("Invalid google endpoint {}: {}", endpoint, e))
        })?;
        url.query_pairs_mut().append_pair("key", auth_token);

        Ok(AuthorizedTarget {
            url: url.to_string(),
            headers: Vec::new(),
        })
    }
}
