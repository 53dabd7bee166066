//! Conversation and message data model
//!
//! A [`Conversation`] is the persisted unit of chat history. Messages are
//! append-only: once pushed they are never edited, and the running
//! counters (`total_messages`, `total_tokens`) only move forward.

use crate::providers::NormalizedResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters kept when deriving a title
pub const TITLE_MAX_CHARS: usize = 50;

/// Characters per estimated token
const CHARS_PER_TOKEN: usize = 4;

/// What a history entry represents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A user prompt or a model answer
    #[default]
    Chat,
    /// A failure shown to the user; never sent back to a provider
    Error,
    /// A local notice (e.g., "new session started"); never sent to a provider
    System,
}

/// One entry of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message text
    pub content: String,
    /// Whether the user wrote it
    pub is_user: bool,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Model that produced an assistant answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Arbitrary extra data (finish reason, usage)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Entry kind
    #[serde(default)]
    pub kind: MessageKind,
}

impl Message {
    fn new(content: impl Into<String>, is_user: bool, kind: MessageKind) -> Self {
        Self {
            content: content.into(),
            is_user,
            timestamp: Utc::now(),
            model: None,
            metadata: None,
            kind,
        }
    }

    /// Creates a user chat message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::conversation::{Message, MessageKind};
    ///
    /// let msg = Message::user("Hello");
    /// assert!(msg.is_user);
    /// assert_eq!(msg.kind, MessageKind::Chat);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, true, MessageKind::Chat)
    }

    /// Creates an assistant chat message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(content, false, MessageKind::Chat)
    }

    /// Creates an error entry
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(content, false, MessageKind::Error)
    }

    /// Creates a local system notice
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(content, false, MessageKind::System)
    }

    /// Sets the model that produced this message
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attaches metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether this entry is part of the context sent to providers
    pub fn is_sendable(&self) -> bool {
        self.kind == MessageKind::Chat
    }
}

/// A chat session with its history and running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Session identifier (UUID v4)
    pub session_id: String,
    /// Owner of the session
    pub user_id: String,
    /// Ordered history
    pub messages: Vec<Message>,
    /// Title derived from the first user message
    pub title: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the last message was appended
    pub updated_at: DateTime<Utc>,
    /// Always equal to `messages.len()`
    pub total_messages: usize,
    /// Estimated tokens exchanged, never decreasing
    pub total_tokens: u64,
}

impl Conversation {
    /// Starts an empty conversation with a fresh session id
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::with_session_id(Uuid::new_v4().to_string(), user_id)
    }

    /// Starts an empty conversation with a known session id
    pub fn with_session_id(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            messages: Vec::new(),
            title: String::new(),
            created_at: now,
            updated_at: now,
            total_messages: 0,
            total_tokens: 0,
        }
    }

    /// Appends a message and updates the counters
    pub fn push(&mut self, message: Message) {
        if self.title.is_empty() && message.is_user && message.kind == MessageKind::Chat {
            self.title = derive_title(&message.content);
        }
        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
        self.total_messages = self.messages.len();
    }

    /// Records a successful exchange: the user's text, then the answer
    ///
    /// Adds `ceil((input_chars + output_chars) / 4)` to `total_tokens`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::conversation::Conversation;
    /// use chatrelay::providers::NormalizedResponse;
    ///
    /// let mut conversation = Conversation::new("alice");
    /// let response = NormalizedResponse {
    ///     content: "Hi!".to_string(),
    ///     finish_reason: Some("stop".to_string()),
    ///     usage: None,
    ///     model: "llama-3.1-8b-instant".to_string(),
    /// };
    /// conversation.record_exchange("Hello", &response);
    ///
    /// assert_eq!(conversation.total_messages, 2);
    /// assert_eq!(conversation.total_tokens, 2);
    /// assert_eq!(conversation.title, "Hello");
    /// ```
    pub fn record_exchange(&mut self, user_text: &str, response: &NormalizedResponse) {
        self.push(Message::user(user_text));

        let mut answer = Message::assistant(response.content.clone());
        if !response.model.is_empty() {
            answer = answer.with_model(response.model.clone());
        }
        if response.finish_reason.is_some() || response.usage.is_some() {
            answer = answer.with_metadata(serde_json::json!({
                "finish_reason": response.finish_reason,
                "usage": response.usage,
            }));
        }
        self.push(answer);

        self.total_tokens += estimate_tokens(user_text, &response.content);
    }

    /// Records a failed exchange as an error entry
    pub fn record_error(&mut self, text: impl Into<String>) {
        self.push(Message::error(text));
    }

    /// Entries that may be sent to a provider as context
    pub fn sendable_history(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_sendable())
    }
}

/// Approximate token count for one exchange
pub fn estimate_tokens(input: &str, output: &str) -> u64 {
    let chars = input.chars().count() + output.chars().count();
    ((chars + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN) as u64
}

fn derive_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    let mut title: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
    if first_line.chars().count() > TITLE_MAX_CHARS {
        title = title.trim_end().to_string();
        title.push_str("...");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TokenUsage;

    fn response(content: &str) -> NormalizedResponse {
        NormalizedResponse {
            content: content.to_string(),
            finish_reason: Some("stop".to_string()),
            usage: Some(TokenUsage::new(3, 1)),
            model: "gpt-4o-mini".to_string(),
        }
    }

    #[test]
    fn test_total_messages_tracks_len() {
        let mut conversation = Conversation::new("u1");
        conversation.push(Message::system("started"));
        conversation.record_exchange("q", &response("a"));
        conversation.record_error("boom");
        assert_eq!(conversation.total_messages, conversation.messages.len());
        assert_eq!(conversation.total_messages, 4);
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens("", ""), 0);
        assert_eq!(estimate_tokens("abc", "de"), 2);
        assert_eq!(estimate_tokens("abcd", "efgh"), 2);
        assert_eq!(estimate_tokens("abcd", "efghi"), 3);
    }

    #[test]
    fn test_total_tokens_never_decreases() {
        let mut conversation = Conversation::new("u1");
        let mut last = 0;
        for text in ["a", "", "longer question here"] {
            conversation.record_exchange(text, &response("ok"));
            assert!(conversation.total_tokens >= last);
            last = conversation.total_tokens;
        }
        conversation.record_error("failure");
        assert_eq!(conversation.total_tokens, last);
    }

    #[test]
    fn test_title_from_first_user_message() {
        let mut conversation = Conversation::new("u1");
        conversation.push(Message::system("welcome"));
        conversation.push(Message::user("x".repeat(80)));
        conversation.push(Message::user("second"));
        assert!(conversation.title.starts_with(&"x".repeat(TITLE_MAX_CHARS)));
        assert!(conversation.title.ends_with("..."));
    }

    #[test]
    fn test_record_exchange_metadata() {
        let mut conversation = Conversation::new("u1");
        conversation.record_exchange("q", &response("a"));
        let answer = &conversation.messages[1];
        assert!(!answer.is_user);
        assert_eq!(answer.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(answer.metadata.as_ref().unwrap()["finish_reason"], "stop");
    }

    #[test]
    fn test_sendable_history_skips_error_and_system() {
        let mut conversation = Conversation::new("u1");
        conversation.push(Message::system("notice"));
        conversation.record_exchange("q", &response("a"));
        conversation.record_error("boom");
        let sendable: Vec<_> = conversation.sendable_history().collect();
        assert_eq!(sendable.len(), 2);
    }

    #[test]
    fn test_message_kind_defaults_on_deserialize() {
        let json = r#"{"content":"hi","is_user":true,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.kind, MessageKind::Chat);
    }
}
