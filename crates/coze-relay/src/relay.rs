//! Per-request relay pipeline: upstream events in, ordered text chunks out.
//!
//! A request is answered in two phases. Until the first text delta arrives the
//! caller still owns the HTTP status, so every failure becomes a `500`. Once a
//! delta is in hand the response is committed and a pump task forwards the
//! remaining deltas one at a time. A failure after that point ends the body with
//! an error, which aborts the chunked encoding so the client cannot mistake a
//! truncated answer for a complete one.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::upstream::{UpstreamError, UpstreamEvent, UpstreamStream};

/// Chunks handed to the response body. Capacity 1 keeps the pump at most one
/// chunk ahead of the socket.
pub type ChunkSender = mpsc::Sender<Result<Bytes, RelayError>>;
pub type ChunkReceiver = mpsc::Receiver<Result<Bytes, RelayError>>;

const CHUNK_BUFFER_SIZE: usize = 1;

/// Errors that end a relayed answer.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("upstream reported failure: {0}")]
    Rejected(String),

    #[error("no upstream event within {0:?}")]
    IdleTimeout(Duration),

    #[error("answer exceeded the request timeout of {0:?}")]
    RequestTimeout(Duration),
}

/// Timing limits applied to one relayed request.
#[derive(Debug, Clone, Copy)]
pub struct RelayLimits {
    pub idle_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// What the relay does with one upstream event.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Forward(String),
    Observe,
    End,
}

fn classify(event: UpstreamEvent) -> Result<Step, RelayError> {
    match event {
        UpstreamEvent::MessageDelta { content } if content.is_empty() => Ok(Step::Observe),
        UpstreamEvent::MessageDelta { content } => Ok(Step::Forward(content)),
        UpstreamEvent::Done => Ok(Step::End),
        UpstreamEvent::ChatFailed { message } | UpstreamEvent::Error { message } => {
            Err(RelayError::Rejected(message))
        }
        other => {
            debug!(event = other.name(), "observed upstream event");
            Ok(Step::Observe)
        }
    }
}

/// Reads upstream events under the idle and request timeouts.
pub struct UpstreamReader {
    stream: UpstreamStream,
    limits: RelayLimits,
    deadline: Instant,
}

impl UpstreamReader {
    pub fn new(stream: UpstreamStream, limits: RelayLimits) -> Self {
        Self {
            stream,
            limits,
            deadline: Instant::now() + limits.request_timeout,
        }
    }

    /// Next event, `None` at end of stream.
    async fn next_event(&mut self) -> Result<Option<UpstreamEvent>, RelayError> {
        let now = Instant::now();
        if now >= self.deadline {
            return Err(RelayError::RequestTimeout(self.limits.request_timeout));
        }
        let remaining = self.deadline - now;
        let wait = self.limits.idle_timeout.min(remaining);

        match tokio::time::timeout(wait, self.stream.next()).await {
            Err(_) if wait < self.limits.idle_timeout => {
                Err(RelayError::RequestTimeout(self.limits.request_timeout))
            }
            Err(_) => Err(RelayError::IdleTimeout(self.limits.idle_timeout)),
            Ok(None) => Ok(None),
            Ok(Some(Ok(event))) => Ok(Some(event)),
            Ok(Some(Err(e))) => Err(RelayError::Upstream(e)),
        }
    }

    /// Next step that matters to the client: a text chunk, or `None` at the end.
    async fn next_chunk(&mut self) -> Result<Option<String>, RelayError> {
        loop {
            let Some(event) = self.next_event().await? else {
                return Ok(None);
            };
            match classify(event)? {
                Step::Forward(content) => return Ok(Some(content)),
                Step::Observe => continue,
                Step::End => return Ok(None),
            }
        }
    }
}

/// Accumulated answer, kept only for logging after the fact.
#[derive(Debug)]
pub struct Transcript {
    bot_id: String,
    text: String,
    chunks: usize,
    started: Instant,
}

impl Transcript {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            text: String::new(),
            chunks: 0,
            started: Instant::now(),
        }
    }

    fn push(&mut self, content: &str) {
        debug!(bot_id = %self.bot_id, chunk = %content, "forwarding delta");
        self.text.push_str(content);
        self.chunks += 1;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    fn complete(&self) {
        info!(
            bot_id = %self.bot_id,
            bytes = self.text.len(),
            chunks = self.chunks,
            elapsed_ms = self.elapsed_ms(),
            "relay completed"
        );
        debug!(bot_id = %self.bot_id, response = %self.text, "complete response");
    }

    fn fail(&self, err: &RelayError) {
        error!(
            bot_id = %self.bot_id,
            bytes = self.text.len(),
            chunks = self.chunks,
            elapsed_ms = self.elapsed_ms(),
            error = %err,
            "relay failed after response was committed"
        );
    }

    fn abandon(&self) {
        warn!(
            bot_id = %self.bot_id,
            bytes = self.text.len(),
            chunks = self.chunks,
            "client disconnected, abandoning upstream call"
        );
    }
}

/// Outcome of waiting for the commit point.
pub enum Opening {
    /// First delta arrived; the rest streams through the receiver.
    Streaming(ChunkReceiver),
    /// Upstream finished cleanly without any text.
    Empty,
}

/// Wait for the first delta, then hand the rest of the stream to a pump task.
///
/// Errors returned here happen before any byte was written to the client.
pub async fn open(
    mut reader: UpstreamReader,
    mut transcript: Transcript,
) -> Result<Opening, RelayError> {
    let Some(first) = reader.next_chunk().await? else {
        transcript.complete();
        return Ok(Opening::Empty);
    };

    let (tx, rx) = mpsc::channel(CHUNK_BUFFER_SIZE);
    transcript.push(&first);
    // The buffer is empty, so this cannot wait.
    if tx.send(Ok(Bytes::from(first))).await.is_err() {
        return Ok(Opening::Empty);
    }

    tokio::spawn(pump(reader, tx, transcript));
    Ok(Opening::Streaming(rx))
}

/// Forward deltas until the upstream ends, fails, or the client goes away.
async fn pump(mut reader: UpstreamReader, tx: ChunkSender, mut transcript: Transcript) {
    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => {
                transcript.abandon();
                return;
            }
            next = reader.next_chunk() => next,
        };

        match next {
            Ok(Some(content)) => {
                transcript.push(&content);
                if tx.send(Ok(Bytes::from(content))).await.is_err() {
                    transcript.abandon();
                    return;
                }
            }
            Ok(None) => {
                transcript.complete();
                return;
            }
            Err(err) => {
                transcript.fail(&err);
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }
}
