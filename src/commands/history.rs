use crate::cli::HistoryCommand;
use crate::conversation::{Message, MessageKind};
use crate::error::{ChatRelayError, Result};
use crate::storage::{SqliteStorage, StoredSession, UsageSummary};
use colored::Colorize;
use prettytable::{format, Table};

/// Width of the title column in the session table
const TITLE_COLUMN_CHARS: usize = 40;

/// Handle history commands
pub fn handle_history(storage: &SqliteStorage, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List { user } => {
            let sessions = storage.list_conversations(user.as_deref())?;

            if sessions.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            println!("\nConversation History:");
            session_table(&sessions).printstd();
            println!();
            println!(
                "Use {} to resume a session.",
                "chatrelay chat --session <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id, limit } => {
            let conversation = storage.load_conversation(&id)?.ok_or_else(|| {
                ChatRelayError::Storage(format!("Conversation {} not found", id))
            })?;

            println!(
                "\n{} {}",
                conversation.title.bold(),
                format!("({})", conversation.session_id).dimmed()
            );
            println!(
                "User {} | {} messages | ~{} tokens | created {}\n",
                conversation.user_id,
                conversation.total_messages,
                conversation.total_tokens,
                conversation.created_at.format("%Y-%m-%d %H:%M")
            );
            print_messages(&conversation.messages, limit);
        }
        HistoryCommand::Delete { id } => {
            let removed = storage.delete_conversation(&id)?;
            if removed == 0 {
                println!("{}", format!("No conversation matched {}", id).yellow());
            } else {
                println!("{}", format!("Deleted conversation {}", id).green());
            }
        }
    }

    Ok(())
}

/// Print usage totals for `user_id`
pub fn show_usage(storage: &SqliteStorage, user_id: &str) -> Result<()> {
    let usage = storage.usage_for_user(user_id)?;
    print_usage(&usage);
    Ok(())
}

fn print_usage(usage: &UsageSummary) {
    println!("\nUsage for {}\n", usage.user_id.bold());
    println!("Conversations:  {}", usage.conversations);
    println!("Messages:       {}", usage.total_messages);
    println!("Tokens (est.):  {}", usage.total_tokens);
    println!();
}

/// Build the session table shown by `history list`
pub fn session_table(sessions: &[StoredSession]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "User".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Tokens".bold(),
        "Last Updated".bold()
    ]);

    for session in sessions {
        let id_short: String = session.id.chars().take(8).collect();
        let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();

        table.add_row(prettytable::row![
            id_short.cyan(),
            session.user_id,
            shorten(&session.title, TITLE_COLUMN_CHARS),
            session.total_messages,
            session.total_tokens,
            updated
        ]);
    }

    table
}

/// Print messages, optionally only the last `limit`
pub fn print_messages(messages: &[Message], limit: Option<usize>) {
    if messages.is_empty() {
        println!("{}", "No messages yet.".yellow());
        return;
    }

    let skip = limit
        .map(|n| messages.len().saturating_sub(n))
        .unwrap_or(0);

    for message in &messages[skip..] {
        let time = message.timestamp.format("%H:%M:%S");
        let label = match (message.kind, message.is_user) {
            (MessageKind::Error, _) => "error".red().bold(),
            (MessageKind::System, _) => "system".yellow().bold(),
            (MessageKind::Chat, true) => "you".green().bold(),
            (MessageKind::Chat, false) => message
                .model
                .as_deref()
                .unwrap_or("assistant")
                .blue()
                .bold(),
        };
        println!("{} {}", format!("[{}]", time).dimmed(), label);
        println!("{}\n", message.content);
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
