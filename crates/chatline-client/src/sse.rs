//! Decoding of the `data: ` line stream.
//!
//! The service answers with lines of the form `data: {"chunk": "..."}` and
//! ends the reply with `data: [DONE]`. Bytes are buffered until a full line
//! is available, so multi-byte characters split across reads come out
//! intact.

use std::fmt::Display;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::transport::StreamEvent;

/// Prefix of every line that carries a payload.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that ends the reply.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One payload-bearing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLine {
    /// Trimmed text after the `data: ` prefix.
    Payload(String),
    /// The sentinel line.
    Done,
}

/// Splits a byte stream into `data: ` lines.
///
/// Bytes are buffered until a newline; lines without the prefix are dropped
/// and everything after the sentinel is ignored.
#[derive(Debug, Default)]
pub struct DataLines {
    buffer: Vec<u8>,
    done: bool,
}

impl DataLines {
    /// Create a splitter with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sentinel has been seen.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed the next read and return every line it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DataLine> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            if let Some(line) = self.decode_line(&line[..end]) {
                lines.push(line);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<DataLine> {
        if self.done || self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line).into_iter().collect()
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<DataLine> {
        let line = String::from_utf8_lossy(line);
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();

        if payload == DONE_SENTINEL {
            self.done = true;
            return Some(DataLine::Done);
        }
        Some(DataLine::Payload(payload.to_string()))
    }
}

/// An event decoded from one chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Non-empty text chunk.
    Fragment(String),
    /// The sentinel line.
    Done,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    chunk: Option<String>,
}

/// Incremental decoder for the chat reply stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: DataLines,
}

impl SseDecoder {
    /// Create a decoder with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sentinel has been seen.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.lines.is_done()
    }

    /// Feed the next read and return the events of every line it completes.
    ///
    /// Input after the sentinel is ignored.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.lines.feed(bytes).into_iter().filter_map(chat_event).collect()
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        self.lines.finish().into_iter().filter_map(chat_event).collect()
    }
}

fn chat_event(line: DataLine) -> Option<SseEvent> {
    match line {
        DataLine::Done => Some(SseEvent::Done),
        DataLine::Payload(payload) => parse_chunk(&payload).map(SseEvent::Fragment),
    }
}

fn parse_chunk(payload: &str) -> Option<String> {
    match serde_json::from_str::<ChunkPayload>(payload) {
        Ok(ChunkPayload { chunk: Some(chunk) }) if !chunk.is_empty() => Some(chunk),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, payload, "Skipping malformed stream line");
            None
        }
    }
}

/// Events a line stream can end in, beyond the decoded payloads.
pub(crate) trait LineEvent: Send + 'static {
    /// The stream ended normally.
    fn complete() -> Self;
    /// The stream failed.
    fn error(message: String) -> Self;
}

impl LineEvent for StreamEvent {
    fn complete() -> Self {
        Self::Complete
    }

    fn error(message: String) -> Self {
        Self::Error(message)
    }
}

/// Spawn a task that decodes `response` and forwards its events.
///
/// The channel receives fragments, then exactly one `Complete` or `Error`.
#[must_use]
pub fn stream_events(response: reqwest::Response, capacity: usize) -> mpsc::Receiver<StreamEvent> {
    spawn_lines(response, capacity, |payload| {
        parse_chunk(payload).map(StreamEvent::Fragment)
    })
}

/// Spawn a reader over `response` that maps each payload with `parse`.
pub(crate) fn spawn_lines<T, P>(
    response: reqwest::Response,
    capacity: usize,
    parse: P,
) -> mpsc::Receiver<T>
where
    T: LineEvent,
    P: FnMut(&str) -> Option<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(pump_lines(response.bytes_stream(), tx, parse));
    rx
}

/// Read a chat reply stream to its end, forwarding decoded events to `tx`.
#[cfg(test)]
pub(crate) async fn pump<S, B, E>(stream: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    pump_lines(stream, tx, |payload| parse_chunk(payload).map(StreamEvent::Fragment)).await;
}

/// Read `stream` to its end, forwarding parsed payloads to `tx` and then
/// exactly one completion or error.
pub(crate) async fn pump_lines<S, B, E, T, P>(mut stream: S, tx: mpsc::Sender<T>, mut parse: P)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    T: LineEvent,
    P: FnMut(&str) -> Option<T>,
{
    let mut lines = DataLines::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(bytes) => {
                if forward(lines.feed(bytes.as_ref()), &tx, &mut parse).await {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Response stream failed");
                let _ = tx.send(T::error(e.to_string())).await;
                return;
            }
        }
    }

    if forward(lines.finish(), &tx, &mut parse).await {
        return;
    }
    tracing::debug!("Response ended without sentinel");
    let _ = tx.send(T::complete()).await;
}

/// Send decoded lines on. Returns `true` when reading should stop, either
/// because the stream is complete or because nobody is listening.
async fn forward<T, P>(lines: Vec<DataLine>, tx: &mpsc::Sender<T>, parse: &mut P) -> bool
where
    T: LineEvent,
    P: FnMut(&str) -> Option<T>,
{
    for line in lines {
        let (event, terminal) = match line {
            DataLine::Payload(payload) => match parse(&payload) {
                Some(event) => (event, false),
                None => continue,
            },
            DataLine::Done => (T::complete(), true),
        };
        if tx.send(event).await.is_err() {
            tracing::debug!("Event receiver dropped, abandoning stream");
            return true;
        }
        if terminal {
            return true;
        }
    }
    false
}
