//! Chat client
//!
//! [`ChatClient`] runs one exchange end to end:
//!
//! ```text
//! Idle -> RateCheck -> Sending -> Success
//!                          |--> HttpError -> ErrorMapped -> (RetryScheduled -> Sending)
//!                          |--> Timeout
//!                          `--> Cancelled
//! ```
//!
//! A single call is never retried. Callers that want backoff use
//! [`ChatClient::send_with_retry`], which re-runs the whole pipeline,
//! rate check included, through the [`ExchangePolicy`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::conversation::Message;
use crate::error::{classify, ChatRelayError, Result};
use crate::metrics::ExchangeMetrics;
use crate::policy::ExchangePolicy;
use crate::providers::openai::LOCAL_KEY_SENTINEL;
use crate::providers::{NormalizedResponse, Provider};
use crate::request::{self, RequestOptions};
use crate::response;
use crate::transport::{self, HttpTransport, Transport};

/// Keyring service under which API keys are stored
pub const KEYRING_SERVICE: &str = "chatrelay";

/// Environment variable checked for a key before the vendor variables
pub const API_KEY_ENV_VAR: &str = "CHATRELAY_API_KEY";

/// Per-call overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Provider to use instead of the configured one
    pub provider: Option<Provider>,
    /// Model to use instead of the resolved one
    pub model: Option<String>,
    /// Cancel the call that is currently in flight, if any
    pub cancel_previous: bool,
}

impl SendOptions {
    /// Options targeting `provider`
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider: Some(provider),
            ..Self::default()
        }
    }
}

/// The call currently tracked as active
#[derive(Debug)]
struct ActiveCall {
    id: u64,
    token: CancellationToken,
}

/// Multi-provider chat client
#[derive(Debug)]
pub struct ChatClient {
    config: Config,
    transport: Arc<dyn Transport>,
    policy: ExchangePolicy,
    active: Mutex<Option<ActiveCall>>,
    next_call_id: AtomicU64,
}

impl ChatClient {
    /// Create a client over the reqwest transport
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over an explicit transport
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let policy = ExchangePolicy::from_config(&config);
        Self {
            config,
            transport,
            policy,
            active: Mutex::new(None),
            next_call_id: AtomicU64::new(0),
        }
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared exchange policy
    pub fn policy(&self) -> &ExchangePolicy {
        &self.policy
    }

    /// Transport used for provider calls
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Provider a call with `options` will reach
    pub fn provider_for(&self, options: &SendOptions) -> Provider {
        options.provider.unwrap_or(self.config.provider.api_provider)
    }

    /// Send `message` once
    ///
    /// `history` is the stored conversation so far; it is filtered and
    /// truncated before it is sent.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` before any I/O when the provider's window is
    /// full, and otherwise whatever the pipeline produced. Every failure is
    /// logged before it is returned.
    pub async fn send(
        &self,
        message: &str,
        history: &[Message],
        options: &SendOptions,
    ) -> Result<NormalizedResponse> {
        let (call_id, token) = self.begin_call(options.cancel_previous);
        let result = self.attempt(message, history, options, &token).await;
        self.finish_call(call_id);
        result
    }

    /// Send `message` with exponential backoff on network and server failures
    ///
    /// One cancellation token covers every attempt and every backoff, so
    /// [`cancel_active`](Self::cancel_active) stops the whole loop.
    ///
    /// # Errors
    ///
    /// Returns `Exhausted` once the retry budget is spent, `Cancelled` when
    /// the loop is cancelled, or the first non-retryable error
    pub async fn send_with_retry(
        &self,
        message: &str,
        history: &[Message],
        options: &SendOptions,
    ) -> Result<NormalizedResponse> {
        let provider = self.provider_for(options);
        let (call_id, token) = self.begin_call(options.cancel_previous);
        let result = self
            .policy
            .with_retry_cancellable(provider, message, &token, || {
                self.attempt(message, history, options, &token)
            })
            .await;
        self.finish_call(call_id);
        result
    }

    /// One pass through the pipeline, logged and counted
    async fn attempt(
        &self,
        message: &str,
        history: &[Message],
        options: &SendOptions,
        token: &CancellationToken,
    ) -> Result<NormalizedResponse> {
        let provider = self.provider_for(options);
        let metrics = ExchangeMetrics::start(provider);

        let result = self
            .exchange(provider, message, history, options, token)
            .await;

        match &result {
            Ok(response) => {
                let tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0);
                metrics.record_success(tokens);
                tracing::info!(
                    "{} answered with {} chars (model {})",
                    provider,
                    response.content.len(),
                    response.model
                );
            }
            Err(e) => {
                let category = classify(e).map(|c| c.category()).unwrap_or("unknown");
                metrics.record_error(category);
                tracing::error!("Exchange with {} failed [{}]: {}", provider, category, e);
            }
        }

        result
    }

    /// Abort the active call, if any
    ///
    /// Returns whether a call was cancelled.
    pub fn cancel_active(&self) -> bool {
        match self.active.lock() {
            Ok(mut active) => match active.take() {
                Some(call) => {
                    tracing::info!("Cancelling active request");
                    call.token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Whether a call is currently tracked as active
    pub fn has_active_call(&self) -> bool {
        self.active
            .lock()
            .map(|active| active.is_some())
            .unwrap_or(false)
    }

    async fn exchange(
        &self,
        provider: Provider,
        message: &str,
        history: &[Message],
        options: &SendOptions,
        token: &CancellationToken,
    ) -> Result<NormalizedResponse> {
        let request_options =
            RequestOptions::resolve(&self.config, provider, options.model.as_deref())?;
        let request = request::build(message, history, provider, &request_options)?;
        let api_key = self.resolve_api_key(provider)?;

        // Only requests that are about to go out count against the window
        self.policy.check_rate(provider)?;

        let body = transport::send(
            self.transport.as_ref(),
            provider,
            &request.endpoint,
            &request.payload,
            &api_key,
            self.config.chat.request_timeout(),
            token,
        )
        .await?;
        let mut normalized = response::parse(provider, &body)?;
        if normalized.model.is_empty() {
            normalized.model = request.model;
        }
        Ok(normalized)
    }

    fn begin_call(&self, cancel_previous: bool) -> (u64, CancellationToken) {
        let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        if let Ok(mut active) = self.active.lock() {
            let previous = active.replace(ActiveCall {
                id,
                token: token.clone(),
            });
            if let Some(previous) = previous {
                if cancel_previous {
                    tracing::debug!("Cancelling previous request {}", previous.id);
                    previous.token.cancel();
                }
            }
        }

        (id, token)
    }

    fn finish_call(&self, id: u64) {
        if let Ok(mut active) = self.active.lock() {
            if active.as_ref().map(|call| call.id) == Some(id) {
                *active = None;
            }
        }
    }

    /// Find the API key for `provider`
    ///
    /// Order: the configured key (configured provider only), then
    /// `CHATRELAY_API_KEY`, then the vendor's own variable, then the OS
    /// keyring. The local server falls back to the `"local"` sentinel.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` when no key is found for a remote vendor
    pub fn resolve_api_key(&self, provider: Provider) -> Result<String> {
        if provider == self.config.provider.api_provider {
            if let Some(key) = self.config.provider.api_key.as_ref().filter(|k| !k.is_empty()) {
                return Ok(key.clone());
            }
        }

        if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
            if !key.is_empty() {
                return Ok(key);
            }
        }

        if let Some(var) = provider.api_key_env_var() {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    return Ok(key);
                }
            }
        }

        match load_stored_key(provider) {
            Ok(Some(key)) => return Ok(key),
            Ok(None) => {}
            Err(e) => tracing::debug!("Keyring lookup for {} failed: {}", provider, e),
        }

        if provider == Provider::Local {
            return Ok(LOCAL_KEY_SENTINEL.to_string());
        }

        let hint = provider
            .api_key_env_var()
            .map(|var| format!("set {} or ", var))
            .unwrap_or_default();
        Err(ChatRelayError::InvalidCredentials(format!(
            "No API key for {}: {}run `chatrelay auth --provider {}`",
            provider, hint, provider
        ))
        .into())
    }
}

/// Read a stored key from the OS keyring
///
/// An empty entry counts as no key.
pub fn load_stored_key(provider: Provider) -> Result<Option<String>> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, provider.as_str())?;
    match entry.get_password() {
        Ok(key) if !key.is_empty() => Ok(Some(key)),
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(ChatRelayError::from(e).into()),
    }
}

/// Store `key` for `provider` in the OS keyring
///
/// # Errors
///
/// Returns `Keyring` when the platform store rejects the write
pub fn store_api_key(provider: Provider, key: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, provider.as_str())?;
    entry.set_password(key)?;
    tracing::info!("Stored API key for {} in the system keyring", provider);
    Ok(())
}
