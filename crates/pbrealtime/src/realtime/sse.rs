//! Server-sent event framing.
//!
//! Turns the raw body of a `text/event-stream` response into discrete
//! events. Lines end with `\n`, `\r\n` or `\r`; a terminator may be split
//! across chunks. A blank line dispatches the event being built. An event
//! still being built when the stream ends is discarded.

use futures::stream::{self, Stream, StreamExt};

use crate::error::TransportError;

/// Event name used when the server does not send an `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, or [`DEFAULT_EVENT`].
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream, if any.
    pub id: Option<String>,
    /// Reconnection delay in milliseconds, if this event set one.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Create an event with the given name and data.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    skip_lf: bool,
    started: bool,
    event: Option<String>,
    data: String,
    has_data: bool,
    last_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    /// Create a decoder at the start of a stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if std::mem::take(&mut self.skip_lf) && byte == b'\n' {
                continue;
            }
            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.end_line(&mut events);
                    self.skip_lf = true;
                }
                _ => self.line.push(byte),
            }
        }
        events
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        let raw = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&raw).into_owned();
        if !std::mem::replace(&mut self.started, true) {
            if let Some(rest) = line.strip_prefix('\u{feff}') {
                line = rest.to_string();
            }
        }

        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                events.push(event);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let retry = self.retry.take();
        if !std::mem::take(&mut self.has_data) {
            return None;
        }
        Some(SseEvent {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: std::mem::take(&mut self.data),
            id: self.last_id.clone(),
            retry,
        })
    }
}

/// Decode a stream of body chunks into a stream of events.
///
/// A chunk error is passed through as [`TransportError::Read`].
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<SseEvent, TransportError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();
    chunks
        .map(move |chunk| match chunk {
            Ok(bytes) => decoder.feed(bytes.as_ref()).into_iter().map(Ok).collect(),
            Err(e) => vec![Err(TransportError::Read(e.to_string()))],
        })
        .flat_map(stream::iter)
}
