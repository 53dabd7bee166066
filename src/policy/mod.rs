//! Exchange policy: rate windows and the explicit retry helper
//!
//! One [`ExchangePolicy`] is created per process and owned by the chat
//! client. It holds every piece of mutable cross-call state: the
//! per-provider rate windows and the retry counters. Updates are short
//! critical sections with no await point inside them.

pub mod rate_limit;
pub mod retry;

pub use rate_limit::{RateLimiter, RateWindow};
pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::Config;
use crate::error::{classify, ChatRelayError, Result};
use crate::providers::Provider;
use tokio_util::sync::CancellationToken;

/// Retry counters are keyed by provider and message text
type RetryKey = (Provider, String);

/// Rate windows, retry policy and retry counters
#[derive(Debug)]
pub struct ExchangePolicy {
    limiter: Mutex<RateLimiter>,
    retry: RetryPolicy,
    retry_counts: Mutex<HashMap<RetryKey, u32>>,
}

impl ExchangePolicy {
    /// Create a policy from explicit parts
    pub fn new(limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self {
            limiter: Mutex::new(limiter),
            retry,
            retry_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Create a policy from configuration
    pub fn from_config(config: &Config) -> Self {
        let limits = Provider::ALL
            .into_iter()
            .map(|p| (p, config.rate_limit_for(p)))
            .collect();
        let limiter = RateLimiter::new(
            limits,
            Duration::from_millis(config.policy.rate_window_ms),
        );
        let retry = RetryPolicy::new(
            config.policy.retry_attempts,
            Duration::from_millis(config.policy.retry_base_delay_ms),
        );
        Self::new(limiter, retry)
    }

    /// The retry schedule
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Admit a request to `provider` against its rate window
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` when the window is full
    pub fn check_rate(&self, provider: Provider) -> Result<()> {
        let result = self
            .limiter
            .lock()
            .map_err(|_| ChatRelayError::Configuration("rate limiter lock poisoned".into()))?
            .check(provider);
        if result.is_err() {
            crate::metrics::record_rate_limited(provider);
        }
        result
    }

    /// Snapshot of the rate window for `provider`
    pub fn rate_window(&self, provider: Provider) -> Option<RateWindow> {
        self.limiter
            .lock()
            .ok()
            .and_then(|limiter| limiter.window(provider).cloned())
    }

    /// Retries recorded so far for `(provider, message)`
    pub fn retry_count(&self, provider: Provider, message: &str) -> u32 {
        self.retry_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(&(provider, message.to_string())).copied())
            .unwrap_or(0)
    }

    /// Run `op`, retrying network and server failures with backoff
    ///
    /// Before retry `n` (0-based) the helper sleeps
    /// `base_delay * 2^n`. When the counter for `(provider, message)`
    /// reaches `max_retries`, the last failure is wrapped in `Exhausted`.
    /// Non-retryable errors propagate unchanged. The counter is cleared
    /// whenever the loop ends.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::config::Config;
    /// use chatrelay::error::ChatRelayError;
    /// use chatrelay::policy::ExchangePolicy;
    /// use chatrelay::providers::Provider;
    ///
    /// # tokio_test::block_on(async {
    /// let mut config = Config::default();
    /// config.policy.retry_attempts = 0;
    /// let policy = ExchangePolicy::from_config(&config);
    ///
    /// let result: anyhow::Result<()> = policy
    ///     .with_retry(Provider::Groq, "Hello", || async {
    ///         Err(ChatRelayError::Network("connection reset".to_string()).into())
    ///     })
    ///     .await;
    /// assert!(result.unwrap_err().to_string().contains("after 1 attempts"));
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or `Exhausted`
    pub async fn with_retry<T, F, Fut>(&self, provider: Provider, message: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.with_retry_cancellable(provider, message, &CancellationToken::new(), op)
            .await
    }

    /// [`with_retry`](Self::with_retry) whose backoff sleeps end early when
    /// `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when `cancel` fires during a backoff, otherwise
    /// as [`with_retry`](Self::with_retry)
    pub async fn with_retry_cancellable<T, F, Fut>(
        &self,
        provider: Provider,
        message: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let counter = RetryCounter {
            counts: &self.retry_counts,
            key: (provider, message.to_string()),
            ceiling: self.retry.max_retries,
        };

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retryable = classify(&err).map(|e| e.is_retryable()).unwrap_or(false);
            if !retryable {
                return Err(err);
            }

            let attempt = counter.bump();
            if attempt >= self.retry.max_retries {
                tracing::error!(
                    "Giving up on {} after {} attempts: {}",
                    provider,
                    attempt + 1,
                    err
                );
                return Err(ChatRelayError::Exhausted {
                    attempts: attempt + 1,
                    last_error: err.to_string(),
                }
                .into());
            }

            let delay = self.retry.delay_for_attempt(attempt);
            crate::metrics::record_retry(provider, attempt + 1);
            tracing::warn!(
                "Attempt {} to {} failed ({}); retrying in {}ms",
                attempt + 1,
                provider,
                err,
                delay.as_millis()
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Retry backoff for {} cancelled", provider);
                    return Err(ChatRelayError::Cancelled.into());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Retry counter for one loop; removed when the loop ends, however it ends
struct RetryCounter<'a> {
    counts: &'a Mutex<HashMap<RetryKey, u32>>,
    key: RetryKey,
    ceiling: u32,
}

impl RetryCounter<'_> {
    /// Increment the counter and return its previous value
    fn bump(&self) -> u32 {
        match self.counts.lock() {
            Ok(mut counts) => {
                let count = counts.entry(self.key.clone()).or_insert(0);
                let previous = *count;
                *count += 1;
                previous
            }
            Err(_) => self.ceiling,
        }
    }
}

impl Drop for RetryCounter<'_> {
    fn drop(&mut self) {
        if let Ok(mut counts) = self.counts.lock() {
            counts.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(max_retries: u32, base_ms: u64) -> ExchangePolicy {
        ExchangePolicy::new(
            RateLimiter::new(HashMap::new(), Duration::from_secs(60)),
            RetryPolicy::new(max_retries, Duration::from_millis(base_ms)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_with_doubling_delays() {
        let policy = policy(3, 1000);
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

        let err = policy
            .with_retry(Provider::OpenAi, "Hello", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.lock().unwrap().push(Instant::now());
                    Err::<(), _>(ChatRelayError::ServerUnavailable("502".into()).into())
                }
            })
            .await
            .unwrap_err();

        match err.downcast_ref::<ChatRelayError>() {
            Some(ChatRelayError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(*attempts, 4);
                assert!(last_error.contains("502"));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<u128> = calls
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect();
        assert_eq!(gaps, vec![1000, 2000, 4000]);
        assert_eq!(policy.retry_count(Provider::OpenAi, "Hello"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failure() {
        let policy = policy(3, 100);
        let attempts = AtomicU32::new(0);

        let value = policy
            .with_retry(Provider::Groq, "ping", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ChatRelayError::Network("reset".into()).into())
                    } else {
                        Ok("pong")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "pong");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(policy.retry_count(Provider::Groq, "ping"), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let policy = policy(3, 1000);
        let attempts = AtomicU32::new(0);

        let err = policy
            .with_retry(Provider::Anthropic, "hi", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ChatRelayError::InvalidCredentials("bad key".into()).into()) }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::InvalidCredentials(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_resets_counter() {
        let policy = policy(3, 100);
        let attempts = AtomicU32::new(0);

        let err = policy
            .with_retry(Provider::Groq, "same text", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err::<(), _>(ChatRelayError::Network("reset".into()).into())
                    } else {
                        Err(ChatRelayError::Cancelled.into())
                    }
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::Cancelled)
        ));
        assert_eq!(policy.retry_count(Provider::Groq, "same text"), 0);

        // A later loop on the same text gets the full budget
        let later = AtomicU32::new(0);
        let err = policy
            .with_retry(Provider::Groq, "same text", || {
                later.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ChatRelayError::Network("reset".into()).into()) }
            })
            .await
            .unwrap_err();
        assert_eq!(later.load(Ordering::SeqCst), 4);
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::Exhausted { attempts: 4, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_waiting() {
        let policy = Arc::new(policy(3, 60_000));
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let task = {
            let policy = Arc::clone(&policy);
            let cancel = cancel.clone();
            let attempts = Arc::clone(&attempts);
            tokio::spawn(async move {
                policy
                    .with_retry_cancellable(Provider::OpenAi, "slow", &cancel, || {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        async { Err::<(), _>(ChatRelayError::Network("down".into()).into()) }
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = Instant::now();
        cancel.cancel();
        let err = task.await.unwrap().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::Cancelled)
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(policy.retry_count(Provider::OpenAi, "slow"), 0);
    }

    #[tokio::test]
    async fn test_zero_retries_exhausts_on_first_failure() {
        let policy = policy(0, 1000);
        let err = policy
            .with_retry(Provider::Local, "x", || async {
                Err::<(), _>(ChatRelayError::Timeout { timeout_ms: 5 }.into())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::Exhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_check_rate_uses_configured_limits() {
        let mut config = Config::default();
        config.policy.rate_limits.insert(Provider::Groq, 2);
        let policy = ExchangePolicy::from_config(&config);

        policy.check_rate(Provider::Groq).unwrap();
        policy.check_rate(Provider::Groq).unwrap();
        let err = policy.check_rate(Provider::Groq).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatRelayError>(),
            Some(ChatRelayError::RateLimited { .. })
        ));
        assert_eq!(policy.rate_window(Provider::Groq).unwrap().request_count, 2);
    }

    #[test]
    fn test_from_config_retry_settings() {
        let mut config = Config::default();
        config.policy.retry_attempts = 5;
        config.policy.retry_base_delay_ms = 10;
        let policy = ExchangePolicy::from_config(&config);
        assert_eq!(
            policy.retry_policy(),
            RetryPolicy::new(5, Duration::from_millis(10))
        );
    }
}
