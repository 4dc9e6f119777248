use super::{echo_text, AppContext};
use crate::api::chat;
use crate::api::{HistoryEntry, Sender};
use crate::error::AppResult;
use std::io::Write;
use tracing::info;

pub async fn list_conversations(ctx: &AppContext, out: &mut impl Write) -> AppResult<()> {
    ctx.resolved_session().await?.require_user()?;
    let conversations = chat::list_conversations(&ctx.transport).await?;
    if conversations.is_empty() {
        writeln!(out, "No conversations yet")?;
    }
    for conv in &conversations {
        writeln!(
            out,
            "{}\t{}\t{}",
            conv.id,
            conv.title.as_deref().unwrap_or("New Chat"),
            conv.updated_at.as_deref().unwrap_or(&conv.created_at)
        )?;
    }
    Ok(())
}

pub async fn show_conversation(
    ctx: &AppContext,
    out: &mut impl Write,
    conversation_id: &str,
) -> AppResult<()> {
    ctx.resolved_session().await?.require_user()?;
    let messages = chat::get_messages(&ctx.transport, conversation_id).await?;
    for message in &messages {
        let who = match message.sender {
            Sender::User => "you",
            Sender::Assistant => "bot",
        };
        writeln!(out, "[{}] {}", who, message.content)?;
    }
    Ok(())
}

/// Start a conversation; its id is printed after the reply.
pub async fn new_conversation<W: Write + Send>(
    ctx: &AppContext,
    out: &mut W,
    message: &str,
) -> AppResult<()> {
    ctx.resolved_session().await?.require_user()?;
    let summary = chat::start_conversation(&ctx.transport, message, echo_text(out)).await?;
    writeln!(out)?;
    if let Some(id) = summary.conversation_id {
        info!(conversation_id = %id, "Conversation created");
        writeln!(out, "conversation: {}", id)?;
    }
    Ok(())
}

/// Continue a conversation, sending its stored messages as history.
pub async fn send_message<W: Write + Send>(
    ctx: &AppContext,
    out: &mut W,
    conversation_id: &str,
    message: &str,
) -> AppResult<()> {
    ctx.resolved_session().await?.require_user()?;
    let history: Vec<HistoryEntry> = chat::get_messages(&ctx.transport, conversation_id)
        .await?
        .iter()
        .map(HistoryEntry::from)
        .collect();
    chat::send_message(
        &ctx.transport,
        conversation_id,
        message,
        &history,
        echo_text(out),
    )
    .await?;
    writeln!(out)?;
    Ok(())
}

pub async fn rename_conversation(
    ctx: &AppContext,
    out: &mut impl Write,
    conversation_id: &str,
    title: &str,
) -> AppResult<()> {
    ctx.resolved_session().await?.require_user()?;
    let conv = chat::rename_conversation(&ctx.transport, conversation_id, title).await?;
    writeln!(
        out,
        "Renamed {} to \"{}\"",
        conv.id,
        conv.title.as_deref().unwrap_or(title)
    )?;
    Ok(())
}

pub async fn delete_conversation(
    ctx: &AppContext,
    out: &mut impl Write,
    conversation_id: &str,
) -> AppResult<()> {
    ctx.resolved_session().await?.require_user()?;
    let ack = chat::delete_conversation(&ctx.transport, conversation_id).await?;
    writeln!(
        out,
        "{}",
        ack.message
            .unwrap_or_else(|| format!("Deleted {}", conversation_id))
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context_for, output, signed_in};
    use crate::error::AppError;
    use crate::session::SessionError;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_chat_requires_login() {
        let server = MockServer::start().await;
        let ctx = context_for(&server);
        let mut buf = Vec::new();
        let err = list_conversations(&ctx, &mut buf).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Session(SessionError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_new_conversation_prints_reply_and_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat"))
            .and(body_json(json!({"message": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"conversationId":"c-9"}{"text":"Hello"}{"text":" there"}"#,
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let ctx = signed_in(&server, "user").await;
        let mut buf = Vec::new();
        new_conversation(&ctx, &mut buf, "hi").await.unwrap();
        assert_eq!(output(buf), "Hello there\nconversation: c-9\n");
    }

    #[tokio::test]
    async fn test_send_message_replays_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/chat/c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m-1", "content": "hi", "sender": "user",
                 "conversation_id": "c-1", "created_at": "2025-01-01"},
                {"id": "m-2", "content": "Hello!", "sender": "assistant",
                 "conversation_id": "c-1", "created_at": "2025-01-01"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/c-1"))
            .and(body_json(json!({
                "message": "thanks",
                "history": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "Hello!"}
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("You're welcome", "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ctx = signed_in(&server, "user").await;
        let mut buf = Vec::new();
        send_message(&ctx, &mut buf, "c-1", "thanks").await.unwrap();
        assert_eq!(output(buf), "You're welcome\n");
    }
}
