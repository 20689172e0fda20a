//! Incremental ingestion of a streamed answer into a pending message.
//!
//! Bytes are decoded as they arrive. A multi-byte character split across two
//! chunks is held back until its remaining bytes show up; invalid sequences
//! become U+FFFD, and so does an incomplete sequence left at the end.

use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use log::{debug, warn};
use thiserror::Error;

use crate::transport::{TransportError, TransportResult};

const REPLACEMENT: char = '\u{FFFD}';

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no data from relay within {0:?}")]
    IdleTimeout(Duration),

    #[error("answer interrupted")]
    Interrupted,
}

/// The message being filled in by a stream.
pub trait PendingTarget {
    /// Replace the pending message's content with the text received so far.
    fn update_pending(&mut self, content: &str);

    /// Store the final text and mark the message complete.
    fn finalize_pending(&mut self, content: &str);

    /// Remove the pending message.
    fn discard_pending(&mut self);
}

/// Streaming UTF-8 decoder that never fails.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, keeping a trailing incomplete sequence for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.partial);
        input.extend_from_slice(chunk);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            rest = &after[len..];
                        }
                        None => {
                            self.partial = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// End of input: a held-back incomplete sequence becomes one U+FFFD.
    pub fn finish(&mut self) -> Option<char> {
        if self.partial.is_empty() {
            None
        } else {
            self.partial.clear();
            Some(REPLACEMENT)
        }
    }
}

/// Accumulates decoded text and mirrors it into a [`PendingTarget`].
#[derive(Debug, Default)]
pub struct StreamIngestor {
    decoder: Utf8Decoder,
    text: String,
    chunks: usize,
}

impl StreamIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ingest<P: PendingTarget + ?Sized>(&mut self, chunk: &[u8], target: &mut P) {
        let decoded = self.decoder.decode(chunk);
        self.text.push_str(&decoded);
        self.chunks += 1;
        target.update_pending(&self.text);
    }

    /// Stream ended normally; returns the full answer.
    pub fn finish<P: PendingTarget + ?Sized>(mut self, target: &mut P) -> String {
        if let Some(c) = self.decoder.finish() {
            self.text.push(c);
        }
        debug!(
            "stream finished: {} chunks, {} bytes",
            self.chunks,
            self.text.len()
        );
        target.finalize_pending(&self.text);
        self.text
    }

    pub fn fail<P: PendingTarget + ?Sized>(self, target: &mut P) {
        warn!(
            "stream failed after {} chunks, discarding {} bytes",
            self.chunks,
            self.text.len()
        );
        target.discard_pending();
    }
}

/// Read `stream` to the end, feeding every chunk into `target`.
///
/// On error or when no chunk arrives within `idle_timeout`, the pending message
/// is discarded and the failure returned.
pub async fn drive<S, P>(
    stream: S,
    target: &mut P,
    idle_timeout: Duration,
) -> Result<String, IngestError>
where
    S: Stream<Item = TransportResult<bytes::Bytes>> + Unpin,
    P: PendingTarget + ?Sized,
{
    drive_until(stream, target, idle_timeout, std::future::pending()).await
}

/// Like [`drive`], but gives up with [`IngestError::Interrupted`] as soon as
/// `cancel` completes.
pub async fn drive_until<S, P, C>(
    mut stream: S,
    target: &mut P,
    idle_timeout: Duration,
    cancel: C,
) -> Result<String, IngestError>
where
    S: Stream<Item = TransportResult<bytes::Bytes>> + Unpin,
    P: PendingTarget + ?Sized,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let mut ingestor = StreamIngestor::new();
    loop {
        let step = tokio::select! {
            _ = cancel.as_mut() => {
                debug!("stream interrupted after {} byte(s)", ingestor.text().len());
                ingestor.fail(target);
                return Err(IngestError::Interrupted);
            }
            step = tokio::time::timeout(idle_timeout, stream.next()) => step,
        };
        match step {
            Ok(Some(Ok(chunk))) => ingestor.ingest(&chunk, target),
            Ok(None) => return Ok(ingestor.finish(target)),
            Ok(Some(Err(e))) => {
                ingestor.fail(target);
                return Err(e.into());
            }
            Err(_) => {
                ingestor.fail(target);
                return Err(IngestError::IdleTimeout(idle_timeout));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[derive(Debug, Default)]
    struct Recorder {
        updates: Vec<String>,
        content: Option<String>,
        pending: bool,
        discarded: bool,
    }

    impl PendingTarget for Recorder {
        fn update_pending(&mut self, content: &str) {
            self.updates.push(content.to_string());
            self.content = Some(content.to_string());
            self.pending = true;
        }

        fn finalize_pending(&mut self, content: &str) {
            self.content = Some(content.to_string());
            self.pending = false;
        }

        fn discard_pending(&mut self) {
            self.content = None;
            self.discarded = true;
        }
    }

    fn chunks(parts: &[&[u8]]) -> Vec<TransportResult<Bytes>> {
        parts.iter().map(|p| Ok(Bytes::copy_from_slice(p))).collect()
    }

    #[test]
    fn test_decoder_reassembles_split_character() {
        // "你" is E4 BD A0
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xE4"), "a");
        assert_eq!(decoder.decode(b"\xBD"), "");
        assert_eq!(decoder.decode(b"\xA0b"), "你b");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"\xE4\xBDx"), "\u{FFFD}x");
    }

    #[test]
    fn test_decoder_truncated_tail_becomes_one_replacement() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\xF0\x9F\x98"), "ok");
        assert_eq!(decoder.finish(), Some('\u{FFFD}'));
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_drive_updates_after_every_chunk() {
        let stream = futures::stream::iter(chunks(&[b"Hel", b"lo"]));
        let mut target = Recorder::default();

        let text = drive(stream, &mut target, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(text, "Hello");
        assert_eq!(target.updates, vec!["Hel", "Hello"]);
        assert_eq!(target.content.as_deref(), Some("Hello"));
        assert!(!target.pending);
    }

    #[tokio::test]
    async fn test_drive_multibyte_across_chunks() {
        let stream = futures::stream::iter(chunks(&[b"\xE4\xBD", b"\xA0\xE5\xA5", b"\xBD"]));
        let mut target = Recorder::default();

        let text = drive(stream, &mut target, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "你好");
        assert!(target.updates.iter().all(|u| !u.contains('\u{FFFD}')));
    }

    #[tokio::test]
    async fn test_drive_error_discards_placeholder() {
        let items = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransportError::Status {
                status: 502,
                message: "reset".to_string(),
            }),
        ];
        let mut target = Recorder::default();

        let err = drive(futures::stream::iter(items), &mut target, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Transport(_)));
        assert!(target.discarded);
        assert_eq!(target.content, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_idle_timeout() {
        let stream = futures::stream::pending::<TransportResult<Bytes>>();
        let mut target = Recorder::default();

        let err = drive(stream, &mut target, Duration::from_secs(120))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::IdleTimeout(_)));
        assert!(target.discarded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_until_interrupts_a_stalled_answer() {
        let stream = futures::stream::iter(vec![Ok(Bytes::from_static(b"par"))])
            .chain(futures::stream::pending());
        let mut target = Recorder::default();

        let err = drive_until(
            stream,
            &mut target,
            Duration::from_secs(120),
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IngestError::Interrupted));
        assert_eq!(target.updates, vec!["par".to_string()]);
        assert!(target.discarded);
        assert_eq!(target.content, None);
    }

    #[tokio::test]
    async fn test_drive_until_finishes_when_not_cancelled() {
        let stream = futures::stream::iter(vec![Ok(Bytes::from_static(b"done"))]);
        let mut target = Recorder::default();

        let text = drive_until(
            stream,
            &mut target,
            Duration::from_secs(120),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(text, "done");
        assert!(!target.pending);
    }
}
