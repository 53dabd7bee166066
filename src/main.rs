//! chatrelay - multi-provider LLM chat client
//!
#![doc = "chatrelay - multi-provider LLM chat client"]
#![doc = "Main entry point for the chatrelay application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatrelay::cli::{Cli, Commands, ModelCommand};
use chatrelay::commands;
use chatrelay::config::Config;
use chatrelay::storage::SqliteStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse first so --verbose and --json-logs shape the subscriber
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);
    chatrelay::metrics::init_metrics_exporter();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat {
            provider,
            model,
            session,
            user,
            message,
            retry,
        } => {
            if let Some(p) = &provider {
                tracing::debug!("Using provider override: {}", p);
            }
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }
            if let Some(s) = &session {
                tracing::debug!("Resuming conversation: {}", s);
            }
            if retry {
                tracing::debug!("Retry helper enabled");
            }

            // Provider and model overrides are already folded into `config`
            commands::chat::run_chat(config, session, user, message, retry).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            let storage = SqliteStorage::open(&config)?;
            commands::history::handle_history(&storage, command)?;
            Ok(())
        }
        Commands::Usage { user_id } => {
            let storage = SqliteStorage::open(&config)?;
            commands::history::show_usage(&storage, &user_id)?;
            Ok(())
        }
        Commands::Models { command } => match command {
            ModelCommand::List { provider, json } => {
                commands::models::list_models(&config, provider, json)?;
                Ok(())
            }
        },
        Commands::Health { provider } => {
            commands::health::check_health(&config, provider).await?;
            Ok(())
        }
        Commands::Auth { provider, key } => {
            commands::auth::authenticate(provider, key)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so answers and JSON output on stdout stay clean.
fn init_tracing(verbose: bool, json_logs: bool) {
    let default_filter = if verbose {
        "chatrelay=debug"
    } else {
        "chatrelay=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
