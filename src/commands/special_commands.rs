//! Special commands parser for interactive chat
//!
//! Lines starting with `/` control the session instead of being sent to
//! the provider:
//! - start a fresh session
//! - show the current session's history
//! - switch provider or model
//! - toggle the retry helper
//! - display help
//! - exit
//!
//! Command names are case-insensitive; arguments keep their case.

use crate::providers::Provider;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new session; the current one stays stored
    NewSession,

    /// Print the messages of the current session
    ShowHistory,

    /// Show session id, provider, model and counters
    ShowStatus,

    /// Send subsequent messages to another provider
    SwitchProvider(Provider),

    /// Send subsequent messages to another model
    SwitchModel(String),

    /// Enable or disable the retry helper
    SetRetry(bool),

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; input should be sent to the provider
    None,
}

/// Parse `input` into a [`SpecialCommand`]
///
/// # Examples
///
/// ```
/// use chatrelay::commands::special_commands::{parse_special_command, SpecialCommand};
/// use chatrelay::providers::Provider;
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewSession);
/// assert_eq!(
///     parse_special_command("/provider groq").unwrap(),
///     SpecialCommand::SwitchProvider(Provider::Groq)
/// );
/// assert_eq!(parse_special_command("Hello").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match name.as_str() {
        "/new" | "/clear" => Ok(SpecialCommand::NewSession),
        "/history" => Ok(SpecialCommand::ShowHistory),
        "/status" | "/session" => Ok(SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "exit" | "quit" | "/exit" | "/quit" => Ok(SpecialCommand::Exit),

        "/provider" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "/provider".to_string(),
                    usage: "/provider <openai|google|anthropic|groq|huggingface|local>"
                        .to_string(),
                });
            }
            rest.parse::<Provider>()
                .map(SpecialCommand::SwitchProvider)
                .map_err(|_| CommandError::UnsupportedArgument {
                    command: "/provider".to_string(),
                    arg: rest.to_string(),
                })
        }

        "/model" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/model".to_string(),
                    usage: "/model <model_name>".to_string(),
                })
            } else {
                Ok(SpecialCommand::SwitchModel(rest.to_string()))
            }
        }

        "/retry" => match rest.to_lowercase().as_str() {
            "" | "on" => Ok(SpecialCommand::SetRetry(true)),
            "off" => Ok(SpecialCommand::SetRetry(false)),
            other => Err(CommandError::UnsupportedArgument {
                command: "/retry".to_string(),
                arg: other.to_string(),
            }),
        },

        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

/// Display help text for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

SESSION CONTROL:
  /new              - Start a new session (the current one stays stored)
  /history          - Show the messages of this session
  /status           - Show session id, provider, model and counters
  /exit             - Exit (also: /quit, exit, quit)

PROVIDER AND MODEL:
  /provider <name>  - Switch provider (openai, google, anthropic, groq, huggingface, local)
  /model <name>     - Switch model for the current provider
  /retry [on|off]   - Retry network and server failures with backoff

HELP:
  /help             - Show this help message
  /?                - Same as /help

NOTES:
  - Commands are case-insensitive
  - Regular text (not starting with /) is sent to the provider
  - Ctrl-C while waiting for an answer cancels the request; Ctrl-D exits
"#
    );
}
