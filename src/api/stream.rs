//! Reader for the backend's streamed chat responses.
//!
//! The body is a run of text fragments. A fragment is either a JSON object
//! (conversation assignment, text delta, scraping progress, terminal marker)
//! or raw assistant text. Raw text is forwarded as-is, so no text is ever
//! dropped.

use super::{ApiError, Transport};
use futures::StreamExt;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Scraping progress the backend embeds while it crawls links found in a
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UrlsConfig {
    #[serde(rename = "inProgress", default)]
    pub in_progress: bool,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub completed_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The backend created a conversation for this exchange.
    ConversationAssigned(String),
    TextDelta(String),
    ConfigUpdate(UrlsConfig),
    Done,
}

#[derive(Deserialize)]
struct RawFragment {
    #[serde(rename = "conversationId")]
    conversation_id: Option<serde_json::Value>,
    text: Option<String>,
    urls_config: Option<UrlsConfig>,
    #[serde(default)]
    done: bool,
}

enum Fragment {
    ConversationAssigned(String),
    Content {
        text: Option<String>,
        config: Option<UrlsConfig>,
    },
    Terminal,
    Unrecognized,
}

impl From<RawFragment> for Fragment {
    fn from(raw: RawFragment) -> Self {
        let id = match raw.conversation_id {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        // An empty id does not assign anything.
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            return Fragment::ConversationAssigned(id);
        }
        if raw.done {
            return Fragment::Terminal;
        }
        if raw.text.is_none() && raw.urls_config.is_none() {
            return Fragment::Unrecognized;
        }
        Fragment::Content {
            text: raw.text,
            config: raw.urls_config,
        }
    }
}

/// Split one decoded fragment into events. A terminal marker ends the list
/// with `Done` and discards whatever follows it.
pub fn parse_fragment(text: &str) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let mut rest = text;
    let mut decoded_any = false;

    loop {
        let trimmed = rest.trim_start();
        if !trimmed.starts_with('{') {
            break;
        }
        let mut values = serde_json::Deserializer::from_str(trimmed).into_iter::<RawFragment>();
        let raw = match values.next() {
            Some(Ok(raw)) => raw,
            _ => break,
        };
        let consumed = values.byte_offset();

        match Fragment::from(raw) {
            Fragment::Unrecognized => break,
            Fragment::Terminal => {
                events.push(StreamEvent::Done);
                return events;
            }
            Fragment::ConversationAssigned(id) => {
                events.push(StreamEvent::ConversationAssigned(id));
            }
            Fragment::Content { text, config } => {
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    events.push(StreamEvent::TextDelta(text));
                }
                if let Some(config) = config {
                    events.push(StreamEvent::ConfigUpdate(config));
                }
            }
        }
        decoded_any = true;
        rest = &trimmed[consumed..];
    }

    // Whitespace framing between objects is not assistant text.
    if decoded_any && rest.trim().is_empty() {
        return events;
    }
    if !rest.is_empty() {
        events.push(StreamEvent::TextDelta(rest.to_string()));
    }
    events
}

/// Incremental decoder: bytes in, events out. Multi-byte characters split
/// across reads are held back until complete. `Done` is produced exactly
/// once, either by a terminal marker or by `finish`.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    pending: Vec<u8>,
    finished: bool,
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.pending.extend_from_slice(bytes);
        let text = self.take_text();
        if text.is_empty() {
            return Vec::new();
        }
        let events = parse_fragment(&text);
        if events.last() == Some(&StreamEvent::Done) {
            self.finished = true;
            self.pending.clear();
        }
        events
    }

    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut events = Vec::new();
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            events.push(StreamEvent::TextDelta(tail));
        }
        events.push(StreamEvent::Done);
        events
    }

    fn take_text(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

/// What a finished stream added up to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    pub content: String,
    pub conversation_id: Option<String>,
    pub urls_config: Option<UrlsConfig>,
}

impl StreamSummary {
    fn record(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ConversationAssigned(id) => self.conversation_id = Some(id.clone()),
            StreamEvent::TextDelta(text) => self.content.push_str(text),
            StreamEvent::ConfigUpdate(config) => self.urls_config = Some(config.clone()),
            StreamEvent::Done => {}
        }
    }
}

/// Drain a streamed response, handing every event to `on_event` in arrival
/// order. A read error abandons the stream without a `Done`.
pub async fn read_stream(
    resp: Response,
    mut on_event: impl FnMut(StreamEvent) + Send,
) -> Result<StreamSummary, ApiError> {
    let mut decoder = FragmentDecoder::new();
    let mut summary = StreamSummary::default();
    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                error!(error = %e, "Error reading stream");
                return Err(ApiError::Stream(e.to_string()));
            }
        };
        for event in decoder.push(&chunk) {
            summary.record(&event);
            on_event(event);
        }
        if decoder.is_finished() {
            debug!("Stream signalled completion");
            break;
        }
    }

    for event in decoder.finish() {
        summary.record(&event);
        on_event(event);
    }
    Ok(summary)
}

/// POST `body` to a streaming endpoint and read the reply to the end.
pub async fn fetch_stream<B: Serialize>(
    transport: &Transport,
    endpoint: &str,
    body: &B,
    on_event: impl FnMut(StreamEvent) + Send,
) -> Result<StreamSummary, ApiError> {
    let resp = transport.open_stream(endpoint, body).await?;
    read_stream(resp, on_event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn deltas(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_text_fragments_build_message() {
        let mut decoder = FragmentDecoder::new();
        let mut events = decoder.push(br#"{"text":"Hel"}"#);
        events.extend(decoder.push(br#"{"text":"lo"}"#));
        events.extend(decoder.finish());

        assert_eq!(deltas(&events), "Hello");
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(events.iter().filter(|e| **e == StreamEvent::Done).count(), 1);
    }

    #[test]
    fn test_conversation_id_is_not_text() {
        let events = parse_fragment(r#"{"conversationId":"c-42","text":"ignored"}"#);
        assert_eq!(
            events,
            vec![StreamEvent::ConversationAssigned("c-42".to_string())]
        );
    }

    #[test]
    fn test_raw_text_passes_through() {
        let events = parse_fragment("Sure, here's a list:\n- one");
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta("Sure, here's a list:\n- one".to_string())]
        );
    }

    #[test]
    fn test_text_and_config_both_dispatched() {
        let events = parse_fragment(
            r#"{"text":"Reading links","urls_config":{"inProgress":true,"urls":["https://a.dev"],"completed_urls":[]}}"#,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::TextDelta("Reading links".to_string()));
        match &events[1] {
            StreamEvent::ConfigUpdate(config) => {
                assert!(config.in_progress);
                assert_eq!(config.urls, vec!["https://a.dev".to_string()]);
                assert!(config.completed_urls.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_object_followed_by_raw_text_in_one_read() {
        let events = parse_fragment(r#"{"conversationId":"c-1"}Hello there"#);
        assert_eq!(
            events,
            vec![
                StreamEvent::ConversationAssigned("c-1".to_string()),
                StreamEvent::TextDelta("Hello there".to_string()),
            ]
        );
    }

    #[test]
    fn test_newline_framed_fragments_build_message() {
        let mut decoder = FragmentDecoder::new();
        let mut events = decoder.push(b"{\"text\":\"Hel\"}\n");
        events.extend(decoder.push(b"{\"text\":\"lo\"}\n"));
        events.extend(decoder.finish());
        assert_eq!(deltas(&events), "Hello");
    }

    #[test]
    fn test_conversation_id_with_trailing_newline() {
        let events = parse_fragment("{\"conversationId\":\"c-1\"}\n");
        assert_eq!(
            events,
            vec![StreamEvent::ConversationAssigned("c-1".to_string())]
        );
    }

    #[test]
    fn test_leading_whitespace_raw_text_kept() {
        assert_eq!(
            parse_fragment("\n  indented"),
            vec![StreamEvent::TextDelta("\n  indented".to_string())]
        );
    }

    #[test]
    fn test_empty_conversation_id_is_not_assignment() {
        let events = parse_fragment(r#"{"conversationId":"","text":"Hi"}"#);
        assert_eq!(events, vec![StreamEvent::TextDelta("Hi".to_string())]);
    }

    #[test]
    fn test_unknown_object_kept_as_text() {
        let raw = r#"{"name": "value"}"#;
        assert_eq!(parse_fragment(raw), vec![StreamEvent::TextDelta(raw.to_string())]);
    }

    #[test]
    fn test_incomplete_json_kept_as_text() {
        let raw = r#"{"text": "unterminated"#;
        assert_eq!(parse_fragment(raw), vec![StreamEvent::TextDelta(raw.to_string())]);
    }

    #[test]
    fn test_done_marker_ends_stream_once() {
        let mut decoder = FragmentDecoder::new();
        let events = decoder.push(br#"{"text":"bye"}{"done":true}trailing"#);
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta("bye".to_string()), StreamEvent::Done]
        );
        assert!(decoder.is_finished());
        assert!(decoder.push(b"more").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_split_multibyte_character() {
        let bytes = "héllo".as_bytes();
        let mut decoder = FragmentDecoder::new();
        let mut events = decoder.push(&bytes[..2]);
        events.extend(decoder.push(&bytes[2..]));
        events.extend(decoder.finish());
        assert_eq!(deltas(&events), "héllo");
    }

    #[tokio::test]
    async fn test_fetch_stream_reads_to_end() {
        let server = MockServer::start().await;
        let body = concat!(
            r#"{"conversationId":"c-9"}"#,
            r#"{"text":"Hel"}"#,
            r#"{"text":"lo"}"#
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat"))
            .and(body_json(json!({"message": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let transport = Transport::new(&format!("{}/v1", server.uri())).unwrap();
        let mut seen = Vec::new();
        let summary = fetch_stream(&transport, "/chat", &json!({"message": "hi"}), |event| {
            seen.push(event)
        })
        .await
        .unwrap();

        assert_eq!(summary.content, "Hello");
        assert_eq!(summary.conversation_id.as_deref(), Some("c-9"));
        assert_eq!(
            seen.iter()
                .filter(|e| matches!(e, StreamEvent::ConversationAssigned(_)))
                .count(),
            1
        );
        assert_eq!(seen.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_fetch_stream_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/c-1"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "not allowed"})),
            )
            .mount(&server)
            .await;

        let transport = Transport::new(&format!("{}/v1", server.uri())).unwrap();
        let mut calls = 0;
        let err = fetch_stream(&transport, "/chat/c-1", &json!({"message": "hi"}), |_| {
            calls += 1
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(calls, 0);
    }
}
