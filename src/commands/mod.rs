/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `chat`     - One-shot or interactive chat with persisted history
- `history`  - List, show and delete stored conversations; usage totals
- `models`   - Browse the static model catalog
- `health`   - Check provider endpoints and the local server
- `auth`     - Store provider API keys in the OS keyring
*/

// Chat command handler
pub mod chat;

// Stored conversation commands
pub mod history;

// Model catalog commands
pub mod models;

// Slash commands for interactive chat
pub mod special_commands;

/// Health command
///
/// Checks every provider (or one) and prints the result table.
pub mod health {
    use crate::config::Config;
    use crate::error::Result;
    use crate::providers::Provider;
    use crate::transport::{HealthChecker, HealthStatus, HttpTransport};
    use colored::Colorize;
    use prettytable::{format, row, Table};
    use std::sync::Arc;
    use std::time::Duration;

    /// Check `provider`, or every provider when `None`
    pub async fn check_health(config: &Config, provider: Option<Provider>) -> Result<()> {
        let checker = HealthChecker::new(
            Arc::new(HttpTransport::new()?),
            Duration::from_secs(config.policy.health_cache_ttl_secs),
        );

        let statuses = collect(&checker, config, provider).await;
        health_table(&statuses).printstd();

        let unhealthy = statuses.iter().filter(|s| !s.healthy).count();
        if unhealthy > 0 {
            println!(
                "{}",
                format!("{} provider(s) not ready", unhealthy).yellow()
            );
        }
        Ok(())
    }

    /// Run checks in provider order
    pub async fn collect(
        checker: &HealthChecker,
        config: &Config,
        provider: Option<Provider>,
    ) -> Vec<HealthStatus> {
        let providers: Vec<Provider> = match provider {
            Some(provider) => vec![provider],
            None => Provider::ALL.to_vec(),
        };

        let mut statuses = Vec::with_capacity(providers.len());
        for provider in providers {
            statuses.push(checker.check(config, provider).await);
        }
        statuses
    }

    fn health_table(statuses: &[HealthStatus]) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(row!["Provider", "Status", "Endpoint", "Detail"]);

        for status in statuses {
            let state = if status.healthy {
                "ok".green()
            } else {
                "down".red()
            };
            table.add_row(row![
                status.provider,
                state,
                status.endpoint.as_deref().unwrap_or("-"),
                status.detail
            ]);
        }
        table
    }

}

/// Auth command(s)
///
/// Stores a provider API key in the OS keyring so it does not have to live
/// in the config file or the environment.
pub mod auth {
    use crate::client::store_api_key;
    use crate::error::{ChatRelayError, Result};
    use crate::providers::Provider;
    use rustyline::DefaultEditor;

    /// Store `key` for `provider`, prompting when it is not given
    ///
    /// # Arguments
    ///
    /// * `provider` - Provider the key belongs to
    /// * `key` - API key; read from the terminal when `None`
    pub fn authenticate(provider: Provider, key: Option<String>) -> Result<()> {
        tracing::info!("Storing API key for provider: {}", provider);

        if provider == Provider::Local {
            println!("local: a key is only needed if your local server enforces one.");
        }

        let key = match key {
            Some(key) => key,
            None => {
                let mut rl = DefaultEditor::new()?;
                rl.readline(&format!("{} API key: ", provider))?
            }
        };

        let key = validate_key(&key)?;
        store_api_key(provider, key)?;
        println!("{}: API key stored in the system keyring.", provider);
        Ok(())
    }

    /// Trim `key` and reject blank input
    pub fn validate_key(key: &str) -> Result<&str> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ChatRelayError::Configuration("API key cannot be empty".to_string()).into());
        }
        Ok(key)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_validate_key_trims() {
            assert_eq!(validate_key("  sk-123 \n").unwrap(), "sk-123");
        }

        #[test]
        fn test_blank_key_is_rejected_before_keyring() {
            let err = authenticate(Provider::OpenAi, Some("   ".to_string())).unwrap_err();
            assert!(err.to_string().contains("cannot be empty"));
        }
    }
}
