//! Common provider types for chatrelay
//!
//! This module defines the provider-agnostic shapes that flow through the
//! request pipeline: the role-normalised conversation handed to adapters,
//! per-call request parameters, and the normalized response returned to
//! callers. It also holds the shared HTTP status mapping.

use crate::error::ChatRelayError;
use crate::providers::Provider;
use serde::{Deserialize, Serialize};

/// Maximum number of characters of a provider error body kept in messages
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Speaker of a turn sent to a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed by the user
    User,
    /// Text generated by the model
    Assistant,
}

impl Role {
    /// Wire name used by OpenAI-compatible and Anthropic APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single user or assistant turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Who produced the turn
    pub role: Role,
    /// Turn text
    pub content: String,
}

impl Turn {
    /// Creates a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Conversation context after filtering and truncation
///
/// `turns` always ends with the current user message. Adapters translate
/// this into their vendor's wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedConversation {
    /// Instructional string sent as the single system entry
    pub system: String,
    /// Retained history followed by the current message
    pub turns: Vec<Turn>,
}

impl PreparedConversation {
    /// The message currently being sent
    pub fn current(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Per-call generation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    /// Model identifier sent to the provider
    pub model: String,
    /// Sampling temperature, already clamped to [0, 2]
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

/// Token usage information from a completion
///
/// Tracks the number of tokens used in prompts and completions,
/// as reported by the AI provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Provider-agnostic result of a successful exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// Generated text, trimmed
    pub content: String,
    /// Vendor finish/stop reason, verbatim
    pub finish_reason: Option<String>,
    /// Token counts when the vendor reports them
    pub usage: Option<TokenUsage>,
    /// Model that produced the answer (empty when the vendor omits it)
    pub model: String,
}

/// Extract a human-readable message from a provider error body
///
/// Tries `error.message`, a string `error`, then `message`; falls back to
/// the raw text, truncated.
///
/// # Examples
///
/// ```
/// use chatrelay::providers::base::extract_error_message;
///
/// let body = r#"{"error":{"message":"Incorrect API key provided"}}"#;
/// assert_eq!(extract_error_message(body), "Incorrect API key provided");
/// assert_eq!(extract_error_message(""), "no error details");
/// ```
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no error details".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error").filter(|v| v.is_string()),
            value.get("message"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                return text.to_string();
            }
        }
    }

    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Shared status-code mapping used by every adapter unless overridden
///
/// 401 → InvalidCredentials, 403 → Forbidden, 429 → RateLimited,
/// 5xx → ServerUnavailable, anything else → Provider.
pub fn map_status(provider: Provider, status: u16, body: &str) -> ChatRelayError {
    let detail = extract_error_message(body);
    match status {
        401 => ChatRelayError::InvalidCredentials(format!(
            "{} rejected the API key: {}",
            provider, detail
        )),
        403 => ChatRelayError::Forbidden(format!(
            "{} denied access to this resource: {}",
            provider, detail
        )),
        429 => ChatRelayError::RateLimited {
            message: format!("{} is rate limiting requests: {}", provider, detail),
            retry_after_ms: None,
        },
        500..=599 => ChatRelayError::ServerUnavailable(format!(
            "{} returned {}: {}",
            provider, status, detail
        )),
        _ => ChatRelayError::Provider(format!("{} returned {}: {}", provider, status, detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_message_nested() {
        let body = r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#;
        assert_eq!(extract_error_message(body), "quota exceeded");
    }

    #[test]
    fn test_extract_error_message_string_error() {
        let body = r#"{"error":"Model is currently loading","estimated_time":20.0}"#;
        assert_eq!(extract_error_message(body), "Model is currently loading");
    }

    #[test]
    fn test_extract_error_message_plain_text_truncated() {
        let body = "x".repeat(1000);
        assert_eq!(extract_error_message(&body).len(), MAX_ERROR_BODY_CHARS);
    }

    #[test]
    fn test_map_status_categories() {
        assert!(matches!(
            map_status(Provider::OpenAi, 401, ""),
            ChatRelayError::InvalidCredentials(_)
        ));
        assert!(matches!(
            map_status(Provider::OpenAi, 403, ""),
            ChatRelayError::Forbidden(_)
        ));
        assert!(matches!(
            map_status(Provider::Groq, 429, ""),
            ChatRelayError::RateLimited { .. }
        ));
        assert!(matches!(
            map_status(Provider::Anthropic, 529, ""),
            ChatRelayError::ServerUnavailable(_)
        ));
        assert!(matches!(
            map_status(Provider::Google, 400, "bad"),
            ChatRelayError::Provider(_)
        ));
    }

    #[test]
    fn test_prepared_conversation_current() {
        let prepared = PreparedConversation {
            system: "be brief".to_string(),
            turns: vec![Turn::assistant("earlier"), Turn::user("now")],
        };
        assert_eq!(prepared.current(), Some(&Turn::user("now")));
    }

    #[test]
    fn test_token_usage_new() {
        let usage = TokenUsage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }
}
