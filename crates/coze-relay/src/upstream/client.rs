//! Coze chat API streaming client.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest_eventsource::{Error as SseError, Event as SseEvent, EventSource, retry::Never};
use std::time::Duration;
use tracing::debug;

use coze_protocol::ChatRequest;

use super::error::{UpstreamError, UpstreamResult};
use super::types::{CozeChatBody, ErrorPayload, UpstreamEvent};

/// Ordered events of one upstream chat call.
pub type UpstreamStream = BoxStream<'static, UpstreamResult<UpstreamEvent>>;

/// A provider that answers a chat request with a stream of typed events.
///
/// Each call owns its own connection; dropping the stream abandons the call.
#[async_trait]
pub trait ChatUpstream: Send + Sync {
    async fn open_chat(&self, request: &ChatRequest) -> UpstreamResult<UpstreamStream>;
}

/// Client for the Coze v3 chat API.
#[derive(Debug, Clone)]
pub struct CozeClient {
    /// HTTP client.
    client: Client,
    /// Base URL (e.g., "https://api.coze.cn").
    base_url: String,
    /// Personal access token.
    token: String,
}

impl CozeClient {
    /// Create a new Coze client.
    ///
    /// `request_timeout` bounds the whole streamed answer, not just the headers.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> UpstreamResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(UpstreamError::MissingToken);
        }

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/v3/chat", self.base_url)
    }
}

#[async_trait]
impl ChatUpstream for CozeClient {
    async fn open_chat(&self, request: &ChatRequest) -> UpstreamResult<UpstreamStream> {
        let url = self.chat_url();
        debug!(url = %url, bot_id = %request.bot_id, "opening upstream chat stream");

        let builder = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "text/event-stream")
            .json(&CozeChatBody {
                request,
                stream: true,
                auto_save_history: true,
            });

        let mut es = EventSource::new(builder)
            .map_err(|e| UpstreamError::Protocol(format!("request cannot be streamed: {}", e)))?;
        // A chat POST is not idempotent; never replay it.
        es.set_retry_policy(Box::new(Never));

        Ok(event_stream(es))
    }
}

/// Turn an [`EventSource`] into typed events, ending after `done` or transport end.
fn event_stream(es: EventSource) -> UpstreamStream {
    futures::stream::unfold(Some(es), |state| async move {
        let mut es = state?;
        loop {
            match es.next().await {
                None => return None,
                Some(Ok(SseEvent::Open)) => continue,
                Some(Ok(SseEvent::Message(msg))) => {
                    let event = UpstreamEvent::parse(&msg.event, &msg.data);
                    if matches!(event, Ok(UpstreamEvent::Done)) {
                        es.close();
                        return Some((event, None));
                    }
                    return Some((event, Some(es)));
                }
                Some(Err(SseError::StreamEnded)) => {
                    es.close();
                    return None;
                }
                Some(Err(err)) => {
                    es.close();
                    return Some((Err(map_sse_error(err).await), None));
                }
            }
        }
    })
    .boxed()
}

async fn map_sse_error(err: SseError) -> UpstreamError {
    match err {
        SseError::Transport(e) => UpstreamError::RequestFailed(e),
        SseError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorPayload>(&body) {
                Ok(payload) if !payload.msg.is_empty() => UpstreamError::ApiError {
                    message: payload.msg.clone(),
                    code: payload.code_string(),
                },
                _ => UpstreamError::Status {
                    status: status.as_u16(),
                    body,
                },
            }
        }
        // Coze reports request errors as a plain JSON body with status 200.
        SseError::InvalidContentType(content_type, response) => {
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorPayload>(&body) {
                Ok(payload) if !payload.msg.is_empty() => UpstreamError::ApiError {
                    message: payload.msg.clone(),
                    code: payload.code_string(),
                },
                _ => UpstreamError::Protocol(format!(
                    "unexpected content type {:?}",
                    content_type
                )),
            }
        }
        other => UpstreamError::Protocol(other.to_string()),
    }
}
