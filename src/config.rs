//! Configuration management for chatrelay
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! Numeric chat settings are clamped into their documented ranges
//! rather than rejected.

use crate::cli::{Cli, Commands};
use crate::error::{ChatRelayError, Result};
use crate::providers::{catalog, Provider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with the model id in endpoint templates
pub const MODEL_PLACEHOLDER: &str = "{model}";

/// Allowed temperature range
pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
/// Allowed max_tokens range
pub const MAX_TOKENS_RANGE: (u32, u32) = (10, 4000);
/// Allowed max_history_messages range
pub const MAX_HISTORY_RANGE: (usize, usize) = (1, 100);

/// Main configuration structure for chatrelay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which provider to call and how to reach it
    #[serde(default)]
    pub provider: ProviderSettings,
    /// Generation and context settings
    #[serde(default)]
    pub chat: ChatSettings,
    /// Rate limiting, retry and health-check settings
    #[serde(default)]
    pub policy: PolicySettings,
    /// History database settings
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider used when a call does not override it
    #[serde(default = "default_api_provider")]
    pub api_provider: Provider,

    /// API key; falls back to env vars and the keyring when unset
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used when a call does not override it
    #[serde(default)]
    pub model: Option<String>,

    /// Custom endpoint for `api_provider` (takes precedence over `endpoints`)
    #[serde(default)]
    pub api_endpoint: Option<String>,

    /// Endpoint table; `{model}` is replaced with the model id
    ///
    /// A table given in the config file replaces the built-in one, so a
    /// provider left out of it has no endpoint.
    #[serde(default = "default_endpoints")]
    pub endpoints: HashMap<Provider, String>,
}

fn default_api_provider() -> Provider {
    Provider::OpenAi
}

fn default_endpoints() -> HashMap<Provider, String> {
    Provider::ALL
        .into_iter()
        .map(|p| (p, p.default_endpoint().to_string()))
        .collect()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_provider: default_api_provider(),
            api_key: None,
            model: None,
            api_endpoint: None,
            endpoints: default_endpoints(),
        }
    }
}

/// Chat generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Sampling temperature, clamped to [0, 2]
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum generated tokens, clamped to [10, 4000]
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// History entries sent as context, clamped to [1, 100]
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Instructional string sent as the system entry
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_max_history_messages() -> usize {
    20
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Answer clearly and concisely.".to_string()
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_history_messages: default_max_history_messages(),
            request_timeout_ms: default_request_timeout_ms(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl ChatSettings {
    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Rate window, retry and health-check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Maximum retries made by the explicit retry helper
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Length of a rate window in milliseconds
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,

    /// Per-provider requests per window; unset providers use the built-in limit
    #[serde(default)]
    pub rate_limits: HashMap<Provider, u32>,

    /// How long health results are cached, in seconds
    #[serde(default = "default_health_cache_ttl_secs")]
    pub health_cache_ttl_secs: u64,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_rate_window_ms() -> u64 {
    60_000
}

fn default_health_cache_ttl_secs() -> u64 {
    30
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            rate_window_ms: default_rate_window_ms(),
            rate_limits: HashMap::new(),
            health_cache_ttl_secs: default_health_cache_ttl_secs(),
        }
    }
}

/// History database settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Database file; defaults to the platform data directory
    #[serde(default)]
    pub history_db: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded, merged and clamped configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);
        config.clamp();

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ChatRelayError::Configuration(format!("Failed to read config file: {}", e))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            ChatRelayError::Configuration(format!("Failed to parse config: {}", e)).into()
        })
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider) = std::env::var("CHATRELAY_PROVIDER") {
            match provider.parse() {
                Ok(value) => self.provider.api_provider = value,
                Err(_) => tracing::warn!("Invalid CHATRELAY_PROVIDER: {}", provider),
            }
        }

        if let Ok(model) = std::env::var("CHATRELAY_MODEL") {
            self.provider.model = Some(model);
        }

        if let Ok(endpoint) = std::env::var("CHATRELAY_API_ENDPOINT") {
            self.provider.api_endpoint = Some(endpoint);
        }

        if let Ok(temperature) = std::env::var("CHATRELAY_TEMPERATURE") {
            if let Ok(value) = temperature.parse() {
                self.chat.temperature = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_TEMPERATURE: {}", temperature);
            }
        }

        if let Ok(max_tokens) = std::env::var("CHATRELAY_MAX_TOKENS") {
            if let Ok(value) = max_tokens.parse() {
                self.chat.max_tokens = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_MAX_TOKENS: {}", max_tokens);
            }
        }

        if let Ok(history) = std::env::var("CHATRELAY_MAX_HISTORY_MESSAGES") {
            if let Ok(value) = history.parse() {
                self.chat.max_history_messages = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_MAX_HISTORY_MESSAGES: {}", history);
            }
        }

        if let Ok(timeout) = std::env::var("CHATRELAY_REQUEST_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse() {
                self.chat.request_timeout_ms = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_REQUEST_TIMEOUT_MS: {}", timeout);
            }
        }

        if let Ok(attempts) = std::env::var("CHATRELAY_RETRY_ATTEMPTS") {
            if let Ok(value) = attempts.parse() {
                self.policy.retry_attempts = value;
            } else {
                tracing::warn!("Invalid CHATRELAY_RETRY_ATTEMPTS: {}", attempts);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(path) = &cli.storage_path {
            self.storage.history_db = Some(PathBuf::from(path));
        }

        if let Commands::Chat {
            provider, model, ..
        } = &cli.command
        {
            if let Some(provider) = provider {
                tracing::debug!("Using provider override: {}", provider);
                if *provider != self.provider.api_provider {
                    // Model, endpoint and key all belong to the configured vendor.
                    self.provider.model = None;
                    self.provider.api_endpoint = None;
                    self.provider.api_key = None;
                }
                self.provider.api_provider = *provider;
            }
            if let Some(model) = model {
                self.provider.model = Some(model.clone());
            }
        }
    }

    /// Clamp numeric chat settings into their allowed ranges
    ///
    /// Each adjustment is logged at `warn` level.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::config::Config;
    ///
    /// let mut config = Config::default();
    /// config.chat.temperature = 3.5;
    /// config.chat.max_tokens = 5;
    /// config.clamp();
    /// assert_eq!(config.chat.temperature, 2.0);
    /// assert_eq!(config.chat.max_tokens, 10);
    /// ```
    pub fn clamp(&mut self) {
        let temperature = if self.chat.temperature.is_nan() {
            default_temperature()
        } else {
            self.chat
                .temperature
                .clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1)
        };
        if temperature != self.chat.temperature {
            tracing::warn!(
                "temperature {} out of range, using {}",
                self.chat.temperature,
                temperature
            );
            self.chat.temperature = temperature;
        }

        let max_tokens = self
            .chat
            .max_tokens
            .clamp(MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1);
        if max_tokens != self.chat.max_tokens {
            tracing::warn!(
                "max_tokens {} out of range, using {}",
                self.chat.max_tokens,
                max_tokens
            );
            self.chat.max_tokens = max_tokens;
        }

        let history = self
            .chat
            .max_history_messages
            .clamp(MAX_HISTORY_RANGE.0, MAX_HISTORY_RANGE.1);
        if history != self.chat.max_history_messages {
            tracing::warn!(
                "max_history_messages {} out of range, using {}",
                self.chat.max_history_messages,
                history
            );
            self.chat.max_history_messages = history;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for a zero timeout, a zero rate window, an
    /// empty system prompt, or an endpoint override that is not a URL
    pub fn validate(&self) -> Result<()> {
        if self.chat.request_timeout_ms == 0 {
            return Err(ChatRelayError::Configuration(
                "request_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.policy.rate_window_ms == 0 {
            return Err(ChatRelayError::Configuration(
                "rate_window_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.system_prompt.trim().is_empty() {
            return Err(ChatRelayError::Configuration(
                "system_prompt cannot be empty".to_string(),
            )
            .into());
        }

        if let Some(endpoint) = &self.provider.api_endpoint {
            let candidate = endpoint.replace(MODEL_PLACEHOLDER, "model");
            url::Url::parse(&candidate).map_err(|e| {
                ChatRelayError::Configuration(format!("Invalid api_endpoint {}: {}", endpoint, e))
            })?;
        }

        Ok(())
    }

    /// Resolve the endpoint for `provider` and `model`
    ///
    /// The `api_endpoint` override applies to the configured provider only.
    /// Otherwise the provider's entry in the endpoint table is used.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the provider has no endpoint
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::config::Config;
    /// use chatrelay::providers::Provider;
    ///
    /// let config = Config::default();
    /// let url = config.resolve_endpoint(Provider::Google, "gemini-1.5-flash").unwrap();
    /// assert!(url.ends_with("/models/gemini-1.5-flash:generateContent"));
    /// ```
    pub fn resolve_endpoint(&self, provider: Provider, model: &str) -> Result<String> {
        let template = self
            .provider
            .api_endpoint
            .as_ref()
            .filter(|_| provider == self.provider.api_provider)
            .or_else(|| self.provider.endpoints.get(&provider))
            .filter(|endpoint| !endpoint.trim().is_empty())
            .ok_or_else(|| {
                ChatRelayError::Configuration(format!(
                    "No endpoint configured for provider {}",
                    provider
                ))
            })?;

        Ok(template.replace(MODEL_PLACEHOLDER, model))
    }

    /// The model to use for `provider`
    ///
    /// The configured model applies to the configured provider; any other
    /// provider gets its catalog default.
    pub fn resolve_model(&self, provider: Provider) -> String {
        match &self.provider.model {
            Some(model) if provider == self.provider.api_provider && !model.is_empty() => {
                model.clone()
            }
            _ => catalog::default_model(provider).to_string(),
        }
    }

    /// Requests allowed per rate window for `provider`
    pub fn rate_limit_for(&self, provider: Provider) -> u32 {
        self.policy
            .rate_limits
            .get(&provider)
            .copied()
            .unwrap_or_else(|| provider.default_rate_limit())
    }
}
