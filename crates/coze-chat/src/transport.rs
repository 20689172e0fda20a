//! Client side of the relay protocol.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use log::debug;
use reqwest::Client;
use reqwest::header::ACCEPT;
use thiserror::Error;
use tracing::instrument;

use coze_protocol::{CHAT_PATH, ChatRequest, ErrorBody};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Raw answer bytes in arrival order.
pub type ByteStream = BoxStream<'static, TransportResult<Bytes>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("relay returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Sends a chat request and yields the answer as it streams in.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> TransportResult<ByteStream>;
}

/// HTTP client for a running relay.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    /// Create a client for the relay at `base_url`.
    ///
    /// Only connecting is bounded here; answers may stream for a long time and
    /// are bounded by the ingestor's idle timeout instead.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, CHAT_PATH)
    }
}

#[async_trait]
impl ChatTransport for RelayClient {
    #[instrument(skip_all, fields(bot_id = %request.bot_id))]
    async fn open_stream(&self, request: &ChatRequest) -> TransportResult<ByteStream> {
        let url = self.chat_url();
        debug!(
            "POST {} ({} messages)",
            url,
            request.additional_messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "text/plain")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed())
    }
}
