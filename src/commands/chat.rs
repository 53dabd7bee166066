//! Chat command handler
//!
//! One-shot mode sends `--message` and prints the answer. Interactive mode
//! runs a rustyline loop. Both persist every exchange, including failed
//! ones, to the history database.

use std::sync::Arc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::client::{ChatClient, SendOptions};
use crate::commands::history::print_messages;
use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
use crate::config::Config;
use crate::conversation::{Conversation, Message};
use crate::error::{ChatRelayError, Result};
use crate::providers::{NormalizedResponse, Provider};
use crate::storage::SqliteStorage;

/// A chat session bound to a client and a history store
#[derive(Debug)]
pub struct ChatSession {
    client: Arc<ChatClient>,
    storage: SqliteStorage,
    conversation: Conversation,
    options: SendOptions,
    retry: bool,
}

impl ChatSession {
    /// Resume `session_id` or start a new session for `user_id`
    ///
    /// # Errors
    ///
    /// Returns `Storage` when `session_id` is given but not found
    pub fn start(
        client: Arc<ChatClient>,
        storage: SqliteStorage,
        session_id: Option<&str>,
        user_id: &str,
    ) -> Result<Self> {
        let conversation = match session_id {
            Some(id) => storage.load_conversation(id)?.ok_or_else(|| {
                ChatRelayError::Storage(format!("Conversation {} not found", id))
            })?,
            None => Conversation::new(user_id),
        };

        tracing::info!(
            "Chat session {} for user {} ({} stored messages)",
            conversation.session_id,
            conversation.user_id,
            conversation.total_messages
        );

        Ok(Self {
            client,
            storage,
            conversation,
            options: SendOptions::default(),
            retry: false,
        })
    }

    /// Enable or disable the retry helper for subsequent messages
    pub fn set_retry(&mut self, retry: bool) {
        self.retry = retry;
    }

    /// Whether the retry helper is enabled
    pub fn retry(&self) -> bool {
        self.retry
    }

    /// Send subsequent messages to `provider` with its default model
    pub fn switch_provider(&mut self, provider: Provider) {
        self.options.provider = Some(provider);
        self.options.model = None;
    }

    /// Send subsequent messages to `model`
    pub fn switch_model(&mut self, model: impl Into<String>) {
        self.options.model = Some(model.into());
    }

    /// Provider the next message goes to
    pub fn provider(&self) -> Provider {
        self.client.provider_for(&self.options)
    }

    /// Model the next message asks for
    pub fn model(&self) -> String {
        self.options
            .model
            .clone()
            .unwrap_or_else(|| self.client.config().resolve_model(self.provider()))
    }

    /// Shared client, used to cancel an in-flight call
    pub fn client(&self) -> Arc<ChatClient> {
        Arc::clone(&self.client)
    }

    /// The conversation so far
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Start a fresh conversation for the same user
    pub fn reset(&mut self) {
        self.conversation = Conversation::new(self.conversation.user_id.clone());
    }

    /// Send `text` and persist the outcome
    ///
    /// On failure the user's text and an error entry are stored; the
    /// error entry is never sent back to a provider as context.
    pub async fn exchange(&mut self, text: &str) -> Result<NormalizedResponse> {
        let result = if self.retry {
            self.client
                .send_with_retry(text, &self.conversation.messages, &self.options)
                .await
        } else {
            self.client
                .send(text, &self.conversation.messages, &self.options)
                .await
        };

        match result {
            Ok(response) => {
                self.conversation.record_exchange(text, &response);
                self.storage.save_conversation(&self.conversation)?;
                Ok(response)
            }
            Err(e) => {
                self.conversation.push(Message::user(text));
                self.conversation.record_error(e.to_string());
                if let Err(save_err) = self.storage.save_conversation(&self.conversation) {
                    tracing::warn!("Failed to persist failed exchange: {}", save_err);
                }
                Err(e)
            }
        }
    }
}

/// Run the chat command
///
/// # Arguments
///
/// * `config` - Effective configuration (provider and model overrides applied)
/// * `session_id` - Session to resume
/// * `user_id` - Owner of a new session
/// * `message` - Send this message and exit instead of starting the loop
/// * `retry` - Use the retry helper
pub async fn run_chat(
    config: Config,
    session_id: Option<String>,
    user_id: String,
    message: Option<String>,
    retry: bool,
) -> Result<()> {
    let storage = SqliteStorage::open(&config)?;
    let client = Arc::new(ChatClient::new(config)?);
    let mut session = ChatSession::start(client, storage, session_id.as_deref(), &user_id)?;
    session.set_retry(retry);

    match message {
        Some(text) => run_one_shot(&mut session, &text).await,
        None => run_interactive(&mut session).await,
    }
}

async fn run_one_shot(session: &mut ChatSession, text: &str) -> Result<()> {
    let response = session.exchange(text).await?;
    println!("{}", response.content);
    eprintln!(
        "{}",
        format!("session {}", session.conversation().session_id).dimmed()
    );
    Ok(())
}

async fn run_interactive(session: &mut ChatSession) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    print_banner(session);

    loop {
        let prompt = format!("[{}] >> ", session.provider()).cyan().to_string();
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!("Readline error: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        match parse_special_command(trimmed) {
            Ok(SpecialCommand::None) => {}
            Ok(SpecialCommand::Exit) => break,
            Ok(command) => {
                apply_command(session, command);
                continue;
            }
            Err(e) => {
                println!("{}", e.to_string().yellow());
                continue;
            }
        }

        match exchange_cancellable(session, trimmed).await {
            Ok(response) => println!("\n{}\n", response.content),
            Err(e) => println!("{}\n", format!("Error: {}", e).red()),
        }
    }

    println!(
        "Session saved as {}",
        session.conversation().session_id.cyan()
    );
    Ok(())
}

/// Run one exchange; Ctrl-C cancels it instead of exiting
async fn exchange_cancellable(session: &mut ChatSession, text: &str) -> Result<NormalizedResponse> {
    let client = session.client();
    let exchange = session.exchange(text);
    tokio::pin!(exchange);

    loop {
        tokio::select! {
            result = &mut exchange => return result,
            _ = tokio::signal::ctrl_c() => {
                if client.cancel_active() {
                    println!("{}", "Cancelling...".yellow());
                }
            }
        }
    }
}

fn apply_command(session: &mut ChatSession, command: SpecialCommand) {
    match command {
        SpecialCommand::NewSession => {
            session.reset();
            println!(
                "Started new session {}\n",
                session.conversation().session_id.cyan()
            );
        }
        SpecialCommand::ShowHistory => {
            print_messages(&session.conversation().messages, None);
        }
        SpecialCommand::ShowStatus => print_status(session),
        SpecialCommand::SwitchProvider(provider) => {
            session.switch_provider(provider);
            println!(
                "Switched to {} ({})\n",
                provider.to_string().green(),
                session.model()
            );
        }
        SpecialCommand::SwitchModel(model) => {
            session.switch_model(model);
            println!("Using model {}\n", session.model().green());
        }
        SpecialCommand::SetRetry(retry) => {
            session.set_retry(retry);
            println!("Retry {}\n", if retry { "enabled" } else { "disabled" });
        }
        SpecialCommand::Help => print_help(),
        SpecialCommand::Exit | SpecialCommand::None => {}
    }
}

fn print_banner(session: &ChatSession) {
    println!("{}", "chatrelay interactive chat".bold());
    print_status(session);
    println!("Type {} for commands, {} to quit.\n", "/help".cyan(), "/exit".cyan());
}

fn print_status(session: &ChatSession) {
    let conversation = session.conversation();
    println!("Session:   {}", conversation.session_id);
    println!("User:      {}", conversation.user_id);
    println!("Provider:  {}", session.provider());
    println!("Model:     {}", session.model());
    println!("Retry:     {}", if session.retry() { "on" } else { "off" });
    println!(
        "Messages:  {} (~{} tokens)\n",
        conversation.total_messages, conversation.total_tokens
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::MessageKind;
    use crate::transport::fake::FakeTransport;

    const REPLY: &str = r#"{"choices":[{"message":{"content":"  Hi!  "},"finish_reason":"stop"}]}"#;

    fn session(fake: &FakeTransport, dir: &tempfile::TempDir) -> ChatSession {
        let mut config = Config::default();
        config.provider.api_provider = Provider::Groq;
        config.provider.api_key = Some("gsk-test".to_string());
        let client = Arc::new(ChatClient::with_transport(config, Arc::new(fake.clone())));
        let storage = SqliteStorage::new_with_path(dir.path().join("history.db")).unwrap();
        ChatSession::start(client, storage, None, "alice").unwrap()
    }

    #[tokio::test]
    async fn test_exchange_persists_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeTransport::new();
        fake.push_reply(200, REPLY);
        fake.push_reply(200, REPLY);
        let mut session = session(&fake, &dir);

        assert_eq!(session.exchange("Hello").await.unwrap().content, "Hi!");
        session.exchange("Again").await.unwrap();

        let second = &fake.requests()[1].body["messages"];
        assert_eq!(second.as_array().unwrap().len(), 4);

        let storage = SqliteStorage::new_with_path(dir.path().join("history.db")).unwrap();
        let id = session.conversation().session_id.clone();
        let stored = storage.load_conversation(&id).unwrap().unwrap();
        assert_eq!(stored.total_messages, 4);
        assert_eq!(stored.title, "Hello");
    }

    #[tokio::test]
    async fn test_failed_exchange_records_error_entry() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeTransport::new();
        fake.push_reply(401, r#"{"error":{"message":"Invalid API Key"}}"#);
        fake.push_reply(200, REPLY);
        let mut session = session(&fake, &dir);

        assert!(session.exchange("Hello").await.is_err());
        let messages = &session.conversation().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].kind, MessageKind::Error);

        session.exchange("Retry please").await.unwrap();
        let sent = fake.requests()[1].body["messages"].as_array().unwrap().clone();
        assert!(sent
            .iter()
            .all(|m| !m["content"].as_str().unwrap_or("").contains("Invalid API Key")));
    }

    #[tokio::test]
    async fn test_switch_provider_resets_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&FakeTransport::new(), &dir);

        session.switch_model("mixtral-8x7b-32768");
        assert_eq!(session.model(), "mixtral-8x7b-32768");

        session.switch_provider(Provider::Anthropic);
        assert_eq!(session.provider(), Provider::Anthropic);
        assert_eq!(
            session.model(),
            crate::providers::catalog::default_model(Provider::Anthropic)
        );
    }

    #[tokio::test]
    async fn test_reset_starts_new_session_for_same_user() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeTransport::new();
        fake.push_reply(200, REPLY);
        let mut session = session(&fake, &dir);
        session.exchange("Hello").await.unwrap();
        let first = session.conversation().session_id.clone();

        session.reset();
        assert_ne!(session.conversation().session_id, first);
        assert_eq!(session.conversation().user_id, "alice");
        assert!(session.conversation().messages.is_empty());
    }

    #[tokio::test]
    async fn test_resume_unknown_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(ChatClient::with_transport(
            Config::default(),
            Arc::new(FakeTransport::new()),
        ));
        let storage = SqliteStorage::new_with_path(dir.path().join("history.db")).unwrap();
        let err = ChatSession::start(client, storage, Some("deadbeef"), "alice").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
