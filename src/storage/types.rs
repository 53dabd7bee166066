use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a stored conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Unique identifier for the session
    pub id: String,
    /// Owner of the session
    pub user_id: String,
    /// Title derived from the first user message
    pub title: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last updated
    pub updated_at: DateTime<Utc>,
    /// Number of messages in the session
    pub total_messages: usize,
    /// Estimated tokens exchanged in the session
    pub total_tokens: u64,
}

/// Aggregate usage for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// User the totals belong to
    pub user_id: String,
    /// Stored conversations
    pub conversations: usize,
    /// Messages across all conversations
    pub total_messages: usize,
    /// Estimated tokens across all conversations
    pub total_tokens: u64,
}
