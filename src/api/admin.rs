use super::stream::{fetch_stream, StreamEvent, StreamSummary};
use super::{
    ApiError, ConversationStats, DashboardStats, HistoryEntry, Message, RequestOptions,
    ScrapingJob, TrainingDoc, Transport, UserChatStats,
};
use reqwest::Url;
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TrainDocRequest {
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Serialize)]
struct TrainWebsiteRequest<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct PlaygroundRequest<'a> {
    message: &'a str,
    history: &'a [HistoryEntry],
}

/// Register an assembled upload as a training document. This is the
/// finalize step of a chunked upload.
pub async fn train_doc(
    transport: &Transport,
    request: &TrainDocRequest,
) -> Result<TrainingDoc, ApiError> {
    transport
        .post("/admin/train/docs", request, RequestOptions::default())
        .await
}

pub async fn list_documents(transport: &Transport) -> Result<Vec<TrainingDoc>, ApiError> {
    transport
        .get("/admin/train/docs", RequestOptions::default())
        .await
}

/// Queue a website for scraping. Only absolute http(s) URLs are accepted.
pub async fn train_website(transport: &Transport, url: &str) -> Result<ScrapingJob, ApiError> {
    validate_website_url(url)?;
    transport
        .post(
            "/admin/train/website",
            &TrainWebsiteRequest { url },
            RequestOptions::default(),
        )
        .await
}

pub async fn list_websites(transport: &Transport) -> Result<Vec<ScrapingJob>, ApiError> {
    transport
        .get("/admin/train/websites", RequestOptions::default())
        .await
}

pub async fn list_users(transport: &Transport) -> Result<Vec<UserChatStats>, ApiError> {
    transport.get("/admin/users", RequestOptions::default()).await
}

pub async fn list_conversations(
    transport: &Transport,
) -> Result<Vec<ConversationStats>, ApiError> {
    transport
        .get("/admin/conversations", RequestOptions::default())
        .await
}

pub async fn conversation_messages(
    transport: &Transport,
    conversation_id: &str,
) -> Result<Vec<Message>, ApiError> {
    transport
        .get(
            &format!("/admin/conversations/{}", conversation_id),
            RequestOptions::default(),
        )
        .await
}

pub async fn dashboard_stats(transport: &Transport) -> Result<DashboardStats, ApiError> {
    transport.get("/admin/stats", RequestOptions::default()).await
}

/// Playground chat: same stream format as a user conversation, nothing is
/// stored server-side.
pub async fn playground_chat(
    transport: &Transport,
    message: &str,
    history: &[HistoryEntry],
    on_event: impl FnMut(StreamEvent) + Send,
) -> Result<StreamSummary, ApiError> {
    fetch_stream(
        transport,
        "/admin/testing",
        &PlaygroundRequest { message, history },
        on_event,
    )
    .await
}

fn validate_website_url(url: &str) -> Result<(), ApiError> {
    let parsed = Url::parse(url).map_err(|e| ApiError::Url {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ApiError::Url {
            url: url.to_string(),
            reason: "expected an http or https address".to_string(),
        });
    }
    Ok(())
}
