//! HuggingFace Inference API adapter
//!
//! Text-generation models on the Inference API take a single prompt
//! string, so the conversation is rendered as a Human/Assistant
//! transcript ending with an open `Assistant:` turn.

use crate::error::{ChatRelayError, Result};
use crate::providers::base::{NormalizedResponse, PreparedConversation, RequestParams, Role};
use crate::providers::{decode_body, Provider, ProviderAdapter, ProviderPayload};
use serde::{Deserialize, Serialize};

/// The Inference API rejects a temperature of exactly zero
const MIN_TEMPERATURE: f32 = 0.01;

/// Request body for a text-generation model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextGenerationRequest {
    /// Rendered transcript
    pub inputs: String,
    /// Generation parameters
    pub parameters: TextGenerationParameters,
}

/// `parameters` object of a text-generation request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextGenerationParameters {
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_new_tokens: u32,
    /// Only return the continuation, not the prompt
    pub return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generation {
    #[serde(default)]
    generated_text: Option<String>,
}

/// Render the conversation as a single prompt
///
/// # Examples
///
/// ```
/// use chatrelay::providers::huggingface::render_transcript;
/// use chatrelay::providers::{PreparedConversation, Turn};
///
/// let prepared = PreparedConversation {
///     system: "Be kind.".to_string(),
///     turns: vec![Turn::user("Hi")],
/// };
/// assert_eq!(render_transcript(&prepared), "Be kind.\n\nHuman: Hi\n\nAssistant:");
/// ```
pub fn render_transcript(conversation: &PreparedConversation) -> String {
    let mut prompt = conversation.system.clone();
    for turn in &conversation.turns {
        let speaker = match turn.role {
            Role::User => "Human",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(&format!("\n\n{}: {}", speaker, turn.content));
    }
    prompt.push_str("\n\nAssistant:");
    prompt
}

/// Adapter for api-inference.huggingface.co
#[derive(Debug, Clone, Copy, Default)]
pub struct HuggingFaceAdapter;

impl ProviderAdapter for HuggingFaceAdapter {
    fn provider(&self) -> Provider {
        Provider::HuggingFace
    }

    fn build_payload(
        &self,
        conversation: &PreparedConversation,
        params: &RequestParams,
    ) -> ProviderPayload {
        ProviderPayload::TextGeneration(TextGenerationRequest {
            inputs: render_transcript(conversation),
            parameters: TextGenerationParameters {
                temperature: params.temperature.max(MIN_TEMPERATURE),
                max_new_tokens: params.max_tokens,
                return_full_text: false,
            },
        })
    }

    fn parse_response(&self, raw_body: &str) -> Result<NormalizedResponse> {
        let generations: Vec<Generation> = decode_body(Provider::HuggingFace, raw_body)?;

        let text = generations
            .into_iter()
            .next()
            .and_then(|g| g.generated_text)
            .ok_or_else(|| {
                ChatRelayError::EmptyResponse("huggingface returned no generations".to_string())
            })?;

        Ok(NormalizedResponse {
            content: text.trim().to_string(),
            finish_reason: None,
            usage: None,
            model: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Turn;

    #[test]
    fn test_render_transcript_with_history() {
        let prepared = PreparedConversation {
            system: "System".to_string(),
            turns: vec![Turn::user("q1"), Turn::assistant("a1"), Turn::user("q2")],
        };
        assert_eq!(
            render_transcript(&prepared),
            "System\n\nHuman: q1\n\nAssistant: a1\n\nHuman: q2\n\nAssistant:"
        );
    }

    #[test]
    fn test_build_payload_parameters() {
        let prepared = PreparedConversation {
            system: "s".to_string(),
            turns: vec![Turn::user("hello")],
        };
        let params = RequestParams {
            model: "mistralai/Mistral-7B-Instruct-v0.2".to_string(),
            temperature: 0.0,
            max_tokens: 200,
        };
        let json = HuggingFaceAdapter
            .build_payload(&prepared, &params)
            .to_json()
            .unwrap();

        assert!(json["inputs"].as_str().unwrap().ends_with("Human: hello\n\nAssistant:"));
        assert_eq!(json["parameters"]["max_new_tokens"], 200);
        assert_eq!(json["parameters"]["return_full_text"], false);
        assert!(json["parameters"]["temperature"].as_f64().unwrap() > 0.0);
        assert!(json.get("messages").is_none());
    }

    #[test]
    fn test_parse_response_generated_text() {
        let response = HuggingFaceAdapter
            .parse_response(r#"[{"generated_text": " Sure thing. "}]"#)
            .unwrap();
        assert_eq!(response.content, "Sure thing.");
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_parse_response_empty_array() {
        let err = HuggingFaceAdapter.parse_response("[]").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::EmptyResponse(_))
        ));
    }

    #[test]
    fn test_parse_response_loading_object_is_invalid() {
        let err = HuggingFaceAdapter
            .parse_response(r#"{"error": "Model is currently loading"}"#)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::InvalidResponse(_))
        ));
    }
}
