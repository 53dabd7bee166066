//! Command-line interface definition for chatrelay
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for chatting, browsing stored history, and
//! managing providers.

use crate::providers::Provider;
use clap::{Parser, Subcommand};

/// chatrelay - multi-provider LLM chat client
///
/// Send messages to OpenAI, Google, Anthropic, Groq, HuggingFace or a
/// local OpenAI-compatible server, with history kept in a local database.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the history database path
    #[arg(long, env = "CHATRELAY_HISTORY_DB")]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for chatrelay
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Chat with a provider (interactive unless --message is given)
    Chat {
        /// Override the provider from config
        #[arg(short, long)]
        provider: Option<Provider>,

        /// Override the model from config
        #[arg(short, long)]
        model: Option<String>,

        /// Resume a stored session (full id or 8-char prefix)
        #[arg(short, long)]
        session: Option<String>,

        /// User the session belongs to
        #[arg(short, long, default_value = "local-user")]
        user: String,

        /// Send a single message and exit
        #[arg(long)]
        message: Option<String>,

        /// Retry network and server failures with exponential backoff
        #[arg(long)]
        retry: bool,
    },

    /// Browse and manage stored conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Show token and message usage for a user
    Usage {
        /// User identifier
        user_id: String,
    },

    /// Browse the model catalog
    Models {
        /// Model subcommand
        #[command(subcommand)]
        command: ModelCommand,
    },

    /// Check whether providers are reachable and configured
    Health {
        /// Only check this provider
        #[arg(short, long)]
        provider: Option<Provider>,
    },

    /// Store a provider API key in the OS keyring
    Auth {
        /// Provider the key belongs to
        #[arg(short, long)]
        provider: Provider,

        /// API key (prompted for when omitted)
        #[arg(short, long)]
        key: Option<String>,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored conversations, newest first
    List {
        /// Only show sessions for this user
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Print a stored conversation
    Show {
        /// Session id (full or 8-char prefix)
        id: String,

        /// Only print the last N messages
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Delete a stored conversation
    Delete {
        /// Session id (full or 8-char prefix)
        id: String,
    },
}

/// Model catalog subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ModelCommand {
    /// List known models
    List {
        /// Filter by provider
        #[arg(short, long)]
        provider: Option<Provider>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            storage_path: None,
            command: Commands::Models {
                command: ModelCommand::List {
                    provider: None,
                    json: false,
                },
            },
        }
    }
}
