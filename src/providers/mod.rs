//! Provider module for chatrelay
//!
//! This module contains the provider enum, the per-provider adapter
//! abstraction, and the adapters for each supported wire format.
//!
//! - `openai`: OpenAI-compatible chat completions (OpenAI, Groq, local server)
//! - `anthropic`: Anthropic messages API
//! - `google`: Google `generateContent`
//! - `huggingface`: HuggingFace text generation (single concatenated prompt)

pub mod anthropic;
pub mod base;
pub mod catalog;
pub mod google;
pub mod huggingface;
pub mod openai;

pub use base::{NormalizedResponse, PreparedConversation, RequestParams, Role, TokenUsage, Turn};
pub use catalog::ProviderModel;

use crate::error::{ChatRelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported chat-completion vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// api.openai.com
    OpenAi,
    /// Google Generative Language API
    Google,
    /// api.anthropic.com
    Anthropic,
    /// api.groq.com (OpenAI-compatible)
    Groq,
    /// HuggingFace Inference API
    HuggingFace,
    /// Locally hosted OpenAI-compatible server
    Local,
}

static OPENAI_ADAPTER: openai::OpenAiCompatibleAdapter =
    openai::OpenAiCompatibleAdapter::new(Provider::OpenAi);
static GROQ_ADAPTER: openai::OpenAiCompatibleAdapter =
    openai::OpenAiCompatibleAdapter::new(Provider::Groq);
static LOCAL_ADAPTER: openai::OpenAiCompatibleAdapter =
    openai::OpenAiCompatibleAdapter::new(Provider::Local);
static ANTHROPIC_ADAPTER: anthropic::AnthropicAdapter = anthropic::AnthropicAdapter;
static GOOGLE_ADAPTER: google::GoogleAdapter = google::GoogleAdapter;
static HUGGINGFACE_ADAPTER: huggingface::HuggingFaceAdapter = huggingface::HuggingFaceAdapter;

impl Provider {
    /// Every provider, in display order
    pub const ALL: [Provider; 6] = [
        Provider::OpenAi,
        Provider::Google,
        Provider::Anthropic,
        Provider::Groq,
        Provider::HuggingFace,
        Provider::Local,
    ];

    /// Lowercase name used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Anthropic => "anthropic",
            Self::Groq => "groq",
            Self::HuggingFace => "huggingface",
            Self::Local => "local",
        }
    }

    /// The adapter that speaks this provider's wire format
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::providers::Provider;
    ///
    /// assert_eq!(Provider::Groq.adapter().provider(), Provider::Groq);
    /// ```
    pub fn adapter(&self) -> &'static dyn ProviderAdapter {
        match self {
            Self::OpenAi => &OPENAI_ADAPTER,
            Self::Groq => &GROQ_ADAPTER,
            Self::Local => &LOCAL_ADAPTER,
            Self::Anthropic => &ANTHROPIC_ADAPTER,
            Self::Google => &GOOGLE_ADAPTER,
            Self::HuggingFace => &HUGGINGFACE_ADAPTER,
        }
    }

    /// Whether requests carry a structured message array
    ///
    /// HuggingFace is the only vendor that takes a single rendered prompt.
    pub fn uses_chat_array(&self) -> bool {
        !matches!(self, Self::HuggingFace)
    }

    /// Built-in endpoint; `{model}` is substituted at resolution time
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::Groq => "https://api.groq.com/openai/v1/chat/completions",
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
            Self::Google => {
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            }
            Self::HuggingFace => "https://api-inference.huggingface.co/models/{model}",
            Self::Local => "http://localhost:1234/v1/chat/completions",
        }
    }

    /// Conservative requests-per-window budget
    pub fn default_rate_limit(&self) -> u32 {
        match self {
            Self::OpenAi => 60,
            Self::Google => 60,
            Self::Anthropic => 50,
            Self::Groq => 30,
            Self::HuggingFace => 10,
            Self::Local => 100,
        }
    }

    /// Vendor-specific environment variable holding an API key
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::HuggingFace => Some("HF_API_KEY"),
            Self::Local => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ChatRelayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                ChatRelayError::Configuration(format!(
                    "Invalid provider: {}. Must be one of: {}",
                    s,
                    Provider::ALL.map(|p| p.as_str()).join(", ")
                ))
            })
    }
}

/// Vendor-specific request body, ready to serialize
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderPayload {
    /// OpenAI-compatible chat completion
    ChatCompletion(openai::ChatCompletionRequest),
    /// Anthropic messages request
    Messages(anthropic::MessagesRequest),
    /// Google generateContent request
    GenerateContent(google::GenerateContentRequest),
    /// HuggingFace text generation with a rendered transcript
    TextGeneration(huggingface::TextGenerationRequest),
}

impl ProviderPayload {
    /// Serialize the payload to a JSON value
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Final URL and headers for an outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedTarget {
    /// Endpoint including any query-string credentials
    pub url: String,
    /// Extra headers (auth, API version)
    pub headers: Vec<(String, String)>,
}

/// One implementation per wire format
///
/// Adapters are stateless; [`Provider::adapter`] hands out static instances.
pub trait ProviderAdapter: Send + Sync {
    /// Provider this adapter is bound to
    fn provider(&self) -> Provider;

    /// Translate a prepared conversation into the vendor's request body
    fn build_payload(
        &self,
        conversation: &PreparedConversation,
        params: &RequestParams,
    ) -> ProviderPayload;

    /// Extract text, finish reason and usage from a raw 2xx body
    ///
    /// # Errors
    ///
    /// Returns `EmptyResponse` when the vendor produced no choices,
    /// `SafetyBlocked` for content-safety rejections, and
    /// `InvalidResponse` when the body cannot be decoded.
    fn parse_response(&self, raw_body: &str) -> Result<NormalizedResponse>;

    /// Map a non-2xx status and body to an error category
    fn map_error(&self, status: u16, body: &str) -> ChatRelayError {
        base::map_status(self.provider(), status, body)
    }

    /// Attach credentials to the endpoint
    ///
    /// The default is a bearer `Authorization` header.
    fn authorize(&self, endpoint: &str, auth_token: &str) -> Result<AuthorizedTarget> {
        Ok(AuthorizedTarget {
            url: endpoint.to_string(),
            headers: vec![(
                "Authorization".to_string(),
                format!("Bearer {}", auth_token),
            )],
        })
    }
}

/// Decode a JSON body into `T`, mapping failures to `InvalidResponse`
pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(
    provider: Provider,
    raw_body: &str,
) -> Result<T> {
    serde_json::from_str(raw_body).map_err(|e| {
        tracing::error!("Failed to parse {} response: {}", provider, e);
        ChatRelayError::InvalidResponse(format!("Failed to parse {} response: {}", provider, e))
            .into()
    })
}
