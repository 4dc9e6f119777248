pub mod admin;
pub mod chat;
pub mod stream;
pub mod transport;
pub mod upload;

use serde::{Deserialize, Serialize};

pub use transport::{RequestOptions, Transport};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "type", default)]
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub conversation_id: String,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// One prior turn sent along with a follow-up message.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: Sender,
    pub content: String,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.sender,
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrainingDoc {
    pub id: String,
    pub file_name: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub character_count: u64,
    pub status: TrainingStatus,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A website ingestion job; owned by the server, displayed as a snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapingJob {
    pub id: String,
    pub url: String,
    pub status: ScrapeStatus,
    #[serde(default)]
    pub pages_found: u32,
    #[serde(default)]
    pub pages_processed: u32,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserChatStats {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub total_conversations: u64,
    pub total_messages: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub conversation_id: String,
    pub created_at: String,
    #[serde(default)]
    pub title: Option<String>,
    pub total_messages: u64,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub messages: u64,
    pub users: u64,
    pub sources: u64,
    pub conversations: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Invalid URL '{url}': {reason}")]
    Url { url: String, reason: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// HTTP status of a normalized error response, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_role_reads_type_field() {
        let user: User = serde_json::from_value(json!({
            "id": "u-1",
            "name": "Ada",
            "email": "ada@example.com",
            "type": "admin",
            "created_at": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.updated_at, None);
    }

    #[test]
    fn test_user_role_defaults_to_user() {
        let user: User = serde_json::from_value(json!({
            "id": "u-2",
            "name": "Bob",
            "email": "bob@example.com"
        }))
        .unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_history_from_message() {
        let message: Message = serde_json::from_value(json!({
            "id": "m-1",
            "content": "hi there",
            "sender": "assistant",
            "conversation_id": "c-1",
            "created_at": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        let entry = HistoryEntry::from(&message);
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"role": "assistant", "content": "hi there"})
        );
    }

    #[test]
    fn test_admin_stats_use_camel_case() {
        let stats: UserChatStats = serde_json::from_value(json!({
            "userId": "u-1",
            "name": "Ada",
            "email": "ada@example.com",
            "createdAt": "2025-01-01",
            "totalConversations": 3,
            "totalMessages": 12
        }))
        .unwrap();
        assert_eq!(stats.total_conversations, 3);
        assert_eq!(stats.total_messages, 12);
    }
}
