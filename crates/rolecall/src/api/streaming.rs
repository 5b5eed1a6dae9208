//! Server-Sent Events (SSE) decoding into a lazy text stream.
//!
//! Every provider streams `data: <json>` lines. [`SseLineBuffer`] reassembles
//! lines across network reads, and a provider-specific [`DataDecoder`] turns
//! each payload into a [`StreamData`]. The result is a [`TextStream`]: a
//! pull-based `futures::Stream` of text fragments that only reads from the
//! network when polled.
//!
//! Malformed payloads are skipped, logged, and counted
//! ([`TextStream::skipped_chunks`]). A transport failure ends the stream
//! with an [`LlmError::Request`].

use crate::api::transport::ByteStream;
use crate::error::{LlmError, Result};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

/// What a single SSE `data:` payload means to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamData {
    /// A text fragment to hand to the consumer.
    Text(String),
    /// The provider signalled the end of the response.
    Done,
    /// A well-formed event with nothing to surface (pings, usage, tool deltas).
    Ignore,
    /// The payload could not be decoded.
    Malformed(String),
}

/// Provider hook that decodes one `data:` payload.
pub type DataDecoder = fn(&str) -> StreamData;

/// Reassembles newline-terminated lines from arbitrary byte chunks.
///
/// Works on bytes so a multi-byte character split across two reads is
/// decoded intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    /// Append a chunk and return every line it completed, trimmed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    /// Take whatever is left after the body ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buf).trim().to_string();
        self.buf.clear();
        if rest.is_empty() { None } else { Some(rest) }
    }
}

enum LineOutcome {
    Text(String),
    Done,
    Continue,
}

/// Interpret one SSE line.
fn handle_line(
    line: &str,
    decoder: DataDecoder,
    provider: &str,
    skipped: &AtomicUsize,
) -> LineOutcome {
    // Only `data:` lines carry payloads.
    let Some(payload) = line.strip_prefix("data:") else {
        return LineOutcome::Continue;
    };
    let payload = payload.trim_start();
    if payload == "[DONE]" {
        return LineOutcome::Done;
    }
    match decoder(payload) {
        StreamData::Text(text) if !text.is_empty() => LineOutcome::Text(text),
        StreamData::Text(_) | StreamData::Ignore => LineOutcome::Continue,
        StreamData::Done => LineOutcome::Done,
        StreamData::Malformed(reason) => {
            let count = skipped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("Skipping malformed {provider} stream chunk #{count}: {reason} (data: {payload})");
            LineOutcome::Continue
        }
    }
}

type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Lazy, forward-only sequence of text fragments from a streaming call.
///
/// Dropping the stream, or calling [`close`](Self::close), drops the
/// underlying HTTP body and releases the connection.
///
/// A provider `error` event sent mid-stream is treated like any other
/// undecodable chunk: it is skipped and counted, and the stream can still
/// end with `None` after a truncated answer. Check
/// [`skipped_chunks`](Self::skipped_chunks) once the stream is drained
/// before treating the collected text as complete.
pub struct TextStream {
    inner: Option<FragmentStream>,
    skipped: Arc<AtomicUsize>,
}

impl TextStream {
    /// Decode an SSE body with the given provider decoder.
    pub(crate) fn from_sse(
        mut body: ByteStream,
        decoder: DataDecoder,
        provider: &'static str,
        model: String,
    ) -> Self {
        let skipped = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&skipped);

        let fragments = async_stream::stream! {
            let mut lines = SseLineBuffer::default();
            let mut fragments = 0usize;
            let mut done = false;

            while !done {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        trace!("{provider} stream read {} bytes", chunk.len());
                        for line in lines.push(&chunk) {
                            match handle_line(&line, decoder, provider, &counter) {
                                LineOutcome::Text(text) => {
                                    fragments += 1;
                                    yield Ok(text);
                                }
                                LineOutcome::Done => {
                                    done = true;
                                    break;
                                }
                                LineOutcome::Continue => {}
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!("{provider} stream aborted: {e}");
                        yield Err(LlmError::request(model.clone(), LlmError::Transport(e)));
                        done = true;
                    }
                    None => {
                        if let Some(line) = lines.finish()
                            && let LineOutcome::Text(text) =
                                handle_line(&line, decoder, provider, &counter)
                        {
                            fragments += 1;
                            yield Ok(text);
                        }
                        done = true;
                    }
                }
            }

            debug!(
                "{provider} stream completed with {fragments} fragment(s), {} skipped",
                counter.load(Ordering::Relaxed)
            );
        };

        Self {
            inner: Some(Box::pin(fragments)),
            skipped,
        }
    }

    /// Stop consuming and release the transport. Later polls yield `None`.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("Text stream closed by consumer");
        }
    }

    /// Whether the stream has finished or been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Number of malformed chunks skipped so far, provider error events
    /// included.
    pub fn skipped_chunks(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Drain the stream and concatenate every fragment.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for TextStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for TextStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStream")
            .field("closed", &self.is_closed())
            .field("skipped", &self.skipped_chunks())
            .finish()
    }
}
