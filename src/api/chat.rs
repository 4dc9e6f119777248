use super::stream::{fetch_stream, StreamEvent, StreamSummary};
use super::{ApiError, Conversation, HistoryEntry, Message, RequestOptions, Transport};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct NewChatRequest<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct FollowUpRequest<'a> {
    message: &'a str,
    history: &'a [HistoryEntry],
}

#[derive(Serialize)]
struct RenameRequest<'a> {
    title: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct Acknowledgement {
    #[serde(default, alias = "msg")]
    pub message: Option<String>,
}

fn conversation_path(id: &str) -> String {
    format!("/chat/{}", id)
}

pub async fn list_conversations(transport: &Transport) -> Result<Vec<Conversation>, ApiError> {
    transport
        .get("/chat/conversations", RequestOptions::default())
        .await
}

/// Messages of one conversation. The backend answers 404 for a conversation
/// with no stored messages yet; that is reported as an empty list.
pub async fn get_messages(
    transport: &Transport,
    conversation_id: &str,
) -> Result<Vec<Message>, ApiError> {
    match transport
        .get(&conversation_path(conversation_id), RequestOptions::default())
        .await
    {
        Err(ApiError::Status { status: 404, .. }) => Ok(Vec::new()),
        other => other,
    }
}

pub async fn rename_conversation(
    transport: &Transport,
    conversation_id: &str,
    title: &str,
) -> Result<Conversation, ApiError> {
    transport
        .patch(
            &conversation_path(conversation_id),
            &RenameRequest { title },
            RequestOptions::default(),
        )
        .await
}

pub async fn delete_conversation(
    transport: &Transport,
    conversation_id: &str,
) -> Result<Acknowledgement, ApiError> {
    transport
        .delete(&conversation_path(conversation_id), RequestOptions::default())
        .await
}

/// Open a new conversation with its first message. The reply stream carries
/// the new conversation id ahead of the assistant text.
pub async fn start_conversation(
    transport: &Transport,
    message: &str,
    on_event: impl FnMut(StreamEvent) + Send,
) -> Result<StreamSummary, ApiError> {
    fetch_stream(transport, "/chat", &NewChatRequest { message }, on_event).await
}

pub async fn send_message(
    transport: &Transport,
    conversation_id: &str,
    message: &str,
    history: &[HistoryEntry],
    on_event: impl FnMut(StreamEvent) + Send,
) -> Result<StreamSummary, ApiError> {
    fetch_stream(
        transport,
        &conversation_path(conversation_id),
        &FollowUpRequest { message, history },
        on_event,
    )
    .await
}
