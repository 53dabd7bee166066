//! Static model catalog
//!
//! A read-only list of the models each provider is known to serve. The
//! first entry for a provider is its default model.

use crate::providers::Provider;
use serde::Serialize;

/// A model offered by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderModel {
    /// Identifier sent on the wire (e.g., "gpt-4o-mini")
    pub id: &'static str,
    /// Display name for user-friendly presentation
    pub display_name: &'static str,
    /// Provider serving the model
    pub provider: Provider,
    /// Maximum context window size in tokens
    pub context_length: usize,
    /// Short description
    pub description: &'static str,
}

const fn model(
    id: &'static str,
    display_name: &'static str,
    provider: Provider,
    context_length: usize,
    description: &'static str,
) -> ProviderModel {
    ProviderModel {
        id,
        display_name,
        provider,
        context_length,
        description,
    }
}

static MODELS: &[ProviderModel] = &[
    model(
        "gpt-4o-mini",
        "GPT-4o mini",
        Provider::OpenAi,
        128_000,
        "Fast, inexpensive general-purpose model",
    ),
    model(
        "gpt-4o",
        "GPT-4o",
        Provider::OpenAi,
        128_000,
        "Flagship multimodal model",
    ),
    model(
        "gpt-3.5-turbo",
        "GPT-3.5 Turbo",
        Provider::OpenAi,
        16_385,
        "Legacy chat model",
    ),
    model(
        "gemini-1.5-flash",
        "Gemini 1.5 Flash",
        Provider::Google,
        1_048_576,
        "Low-latency Gemini model",
    ),
    model(
        "gemini-1.5-pro",
        "Gemini 1.5 Pro",
        Provider::Google,
        2_097_152,
        "Long-context reasoning model",
    ),
    model(
        "claude-3-5-haiku-latest",
        "Claude 3.5 Haiku",
        Provider::Anthropic,
        200_000,
        "Fastest Claude model",
    ),
    model(
        "claude-3-5-sonnet-latest",
        "Claude 3.5 Sonnet",
        Provider::Anthropic,
        200_000,
        "Balanced Claude model",
    ),
    model(
        "llama-3.1-8b-instant",
        "Llama 3.1 8B Instant",
        Provider::Groq,
        131_072,
        "Llama 3.1 8B on Groq LPUs",
    ),
    model(
        "llama-3.3-70b-versatile",
        "Llama 3.3 70B Versatile",
        Provider::Groq,
        131_072,
        "Llama 3.3 70B on Groq LPUs",
    ),
    model(
        "mixtral-8x7b-32768",
        "Mixtral 8x7B",
        Provider::Groq,
        32_768,
        "Mixture-of-experts model on Groq",
    ),
    model(
        "mistralai/Mistral-7B-Instruct-v0.2",
        "Mistral 7B Instruct",
        Provider::HuggingFace,
        32_768,
        "Instruction-tuned Mistral 7B",
    ),
    model(
        "HuggingFaceH4/zephyr-7b-beta",
        "Zephyr 7B Beta",
        Provider::HuggingFace,
        32_768,
        "Chat-tuned Mistral derivative",
    ),
    model(
        "local-model",
        "Local model",
        Provider::Local,
        8_192,
        "Whatever model the local server has loaded",
    ),
];

/// Every known model, grouped by provider
pub fn all_models() -> &'static [ProviderModel] {
    MODELS
}

/// Models served by `provider`
pub fn models_for(provider: Provider) -> impl Iterator<Item = &'static ProviderModel> {
    MODELS.iter().filter(move |m| m.provider == provider)
}

/// Look up a model by identifier (case-insensitive)
pub fn find(id: &str) -> Option<&'static ProviderModel> {
    MODELS.iter().find(|m| m.id.eq_ignore_ascii_case(id))
}

/// The model used when none is configured
///
/// # Examples
///
/// ```
/// use chatrelay::providers::{catalog, Provider};
///
/// assert_eq!(catalog::default_model(Provider::Groq), "llama-3.1-8b-instant");
/// ```
pub fn default_model(provider: Provider) -> &'static str {
    models_for(provider)
        .next()
        .map(|m| m.id)
        .unwrap_or("default")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_provider_has_a_default_model() {
        for provider in Provider::ALL {
            assert!(
                models_for(provider).next().is_some(),
                "{} has no models",
                provider
            );
        }
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let model = find("GPT-4O-MINI").unwrap();
        assert_eq!(model.provider, Provider::OpenAi);
        assert!(find("not-a-model").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<_> = all_models().iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), all_models().len());
    }
}
