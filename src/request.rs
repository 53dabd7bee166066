//! Request builder
//!
//! Turns the current message plus stored history into a vendor payload.
//! Error and system entries never leave the process, and history is cut
//! to the most recent `max_history_messages` entries before the current
//! message is appended as the final user turn.

use crate::config::Config;
use crate::conversation::Message;
use crate::error::{ChatRelayError, Result};
use crate::providers::{PreparedConversation, Provider, ProviderPayload, RequestParams, Turn};

/// Everything the builder needs besides the conversation itself
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Resolved endpoint, `{model}` already substituted
    pub endpoint: String,
    /// Model and sampling parameters
    pub params: RequestParams,
    /// Instructional string sent as the system entry
    pub system_prompt: String,
    /// Retained history entries
    pub max_history_messages: usize,
}

impl RequestOptions {
    /// Resolve options for `provider` from configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the provider has no endpoint
    pub fn resolve(config: &Config, provider: Provider, model: Option<&str>) -> Result<Self> {
        let model = model
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| config.resolve_model(provider));
        let endpoint = config.resolve_endpoint(provider, &model)?;

        Ok(Self {
            endpoint,
            params: RequestParams {
                model,
                temperature: config.chat.temperature,
                max_tokens: config.chat.max_tokens,
            },
            system_prompt: config.chat.system_prompt.clone(),
            max_history_messages: config.chat.max_history_messages,
        })
    }
}

/// A payload ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Target provider
    pub provider: Provider,
    /// Endpoint before credentials are attached
    pub endpoint: String,
    /// Model the payload asks for
    pub model: String,
    /// Vendor request body
    pub payload: ProviderPayload,
}

/// Filter, truncate and role-map the history, then append `message`
///
/// # Examples
///
/// ```
/// use chatrelay::conversation::Message;
/// use chatrelay::request::prepare;
///
/// let history = vec![Message::user("q"), Message::error("boom"), Message::assistant("a")];
/// let prepared = prepare("next", &history, "Be brief.", 20);
/// assert_eq!(prepared.turns.len(), 3);
/// assert_eq!(prepared.current().unwrap().content, "next");
/// ```
pub fn prepare(
    message: &str,
    history: &[Message],
    system_prompt: &str,
    max_history_messages: usize,
) -> PreparedConversation {
    let sendable: Vec<&Message> = history.iter().filter(|m| m.is_sendable()).collect();
    let skip = sendable.len().saturating_sub(max_history_messages);

    let mut turns: Vec<Turn> = sendable[skip..]
        .iter()
        .map(|m| {
            if m.is_user {
                Turn::user(m.content.clone())
            } else {
                Turn::assistant(m.content.clone())
            }
        })
        .collect();
    turns.push(Turn::user(message));

    PreparedConversation {
        system: system_prompt.to_string(),
        turns,
    }
}

/// Build the vendor payload for `message`
///
/// # Errors
///
/// Returns `Configuration` when `options` carries no endpoint
pub fn build(
    message: &str,
    history: &[Message],
    provider: Provider,
    options: &RequestOptions,
) -> Result<ProviderRequest> {
    if options.endpoint.trim().is_empty() {
        return Err(ChatRelayError::Configuration(format!(
            "No endpoint configured for provider {}",
            provider
        ))
        .into());
    }

    let prepared = prepare(
        message,
        history,
        &options.system_prompt,
        options.max_history_messages,
    );
    tracing::debug!(
        "Built {} request with {} turns for model {}",
        provider,
        prepared.turns.len(),
        options.params.model
    );

    Ok(ProviderRequest {
        provider,
        endpoint: options.endpoint.clone(),
        model: options.params.model.clone(),
        payload: provider.adapter().build_payload(&prepared, &options.params),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Role;

    fn options(max_history_messages: usize) -> RequestOptions {
        RequestOptions {
            endpoint: "http://localhost/v1/chat/completions".to_string(),
            params: RequestParams {
                model: "m".to_string(),
                temperature: 0.7,
                max_tokens: 1000,
            },
            system_prompt: "You are helpful.".to_string(),
            max_history_messages,
        }
    }

    fn history(len: usize) -> Vec<Message> {
        (0..len)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("u{}", i))
                } else {
                    Message::assistant(format!("a{}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_prepare_truncates_to_most_recent() {
        let prepared = prepare("now", &history(30), "s", 5);
        assert_eq!(prepared.turns.len(), 6);
        assert_eq!(prepared.turns[0].content, "a25");
        assert_eq!(prepared.current().unwrap(), &Turn::user("now"));
    }

    #[test]
    fn test_prepare_excludes_error_and_system_entries() {
        let mut entries = history(2);
        entries.push(Message::error("Request timed out"));
        entries.push(Message::system("New session"));
        let prepared = prepare("next", &entries, "s", 20);
        assert_eq!(prepared.turns.len(), 3);
        assert!(prepared
            .turns
            .iter()
            .all(|t| !t.content.contains("timed out") && t.content != "New session"));
    }

    #[test]
    fn test_prepare_truncation_counts_only_sendable() {
        let mut entries = history(4);
        entries.insert(3, Message::error("e1"));
        entries.insert(3, Message::error("e2"));
        let prepared = prepare("x", &entries, "s", 4);
        assert_eq!(prepared.turns.len(), 5);
        assert_eq!(prepared.turns[0].content, "u0");
    }

    #[test]
    fn test_prepare_maps_roles() {
        let prepared = prepare("x", &history(2), "s", 20);
        assert_eq!(prepared.turns[0].role, Role::User);
        assert_eq!(prepared.turns[1].role, Role::Assistant);
    }

    #[test]
    fn test_build_every_provider_ends_with_current_message() {
        let entries = history(40);
        for provider in Provider::ALL {
            let request = build("current", &entries, provider, &options(10)).unwrap();
            let json = request.payload.to_json().unwrap();

            match provider {
                Provider::OpenAi | Provider::Groq | Provider::Local => {
                    let messages = json["messages"].as_array().unwrap();
                    assert_eq!(messages.len(), 12);
                    assert_eq!(
                        messages.iter().filter(|m| m["role"] == "system").count(),
                        1
                    );
                    assert_eq!(messages[0]["role"], "system");
                    assert_eq!(messages.last().unwrap()["content"], "current");
                }
                Provider::Anthropic => {
                    let messages = json["messages"].as_array().unwrap();
                    assert_eq!(messages.len(), 11);
                    assert_eq!(json["system"], "You are helpful.");
                    assert_eq!(messages[0]["role"], "user");
                    assert_eq!(messages.last().unwrap()["content"], "current");
                }
                Provider::Google => {
                    let contents = json["contents"].as_array().unwrap();
                    assert_eq!(contents.len(), 11);
                    assert_eq!(contents[0]["role"], "user");
                    assert_eq!(contents.last().unwrap()["parts"][0]["text"], "current");
                }
                Provider::HuggingFace => {
                    let inputs = json["inputs"].as_str().unwrap();
                    assert!(inputs.starts_with("You are helpful."));
                    assert!(inputs.ends_with("Human: current\n\nAssistant:"));
                    assert_eq!(inputs.matches("Human:").count(), 6);
                }
            }
        }
    }

    #[test]
    fn test_build_groq_hello_has_two_messages() {
        let request = build("Hello", &[], Provider::Groq, &options(20)).unwrap();
        let json = request.payload.to_json().unwrap();
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Hello");
    }

    #[test]
    fn test_build_without_endpoint_is_configuration_error() {
        let mut opts = options(20);
        opts.endpoint = String::new();
        let err = build("hi", &[], Provider::Local, &opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::Configuration(_))
        ));
    }

    #[test]
    fn test_resolve_options_from_config() {
        let mut config = Config::default();
        config.provider.api_provider = Provider::Google;
        let opts = RequestOptions::resolve(&config, Provider::Google, Some("gemini-1.5-pro"))
            .unwrap();
        assert!(opts.endpoint.contains("gemini-1.5-pro:generateContent"));
        assert_eq!(opts.params.model, "gemini-1.5-pro");
        assert_eq!(opts.max_history_messages, 20);

        config.provider.endpoints.clear();
        assert!(RequestOptions::resolve(&config, Provider::Google, None).is_err());
    }
}
