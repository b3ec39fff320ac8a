//! Decoder for the gateway's `data: ` line streaming format.
//!
//! A streamed body is UTF-8 text split into lines. Every line that starts with
//! `data: ` carries one payload; the payload `[DONE]` ends the stream. Other
//! lines are ignored. Network chunks may split lines and multi-byte characters
//! anywhere, so the decoder buffers both bytes and text between reads.

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::pin::Pin;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Lazy, finite sequence of payloads from one streamed response.
pub type DataStream = Pin<Box<dyn Stream<Item = Result<String, StreamError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream request failed with status {status}")]
    Status { status: u16 },
    #[error("stream request could not be sent: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("stream body interrupted: {0}")]
    Body(Box<dyn StdError + Send + Sync>),
}

impl StreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

enum Line<'a> {
    Payload(&'a str),
    Done,
    Ignored,
}

fn classify(line: &str) -> Line<'_> {
    match line.strip_prefix(DATA_PREFIX) {
        Some(DONE_SENTINEL) => Line::Done,
        Some(payload) => Line::Payload(payload),
        None => Line::Ignored,
    }
}

/// Incremental byte-to-payload decoder.
#[derive(Debug, Default)]
pub struct DataLineDecoder {
    bytes: Vec<u8>,
    text: String,
    finished: bool,
}

impl DataLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the sentinel has been seen or [`finish`](Self::finish) ran.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one network chunk, returning the payloads of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.decode(chunk);
        self.drain_lines()
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        if !self.bytes.is_empty() {
            self.bytes.clear();
            self.text.push(char::REPLACEMENT_CHARACTER);
        }
        let mut payloads = self.drain_lines();
        if !self.finished && !self.text.is_empty() {
            let rest = std::mem::take(&mut self.text);
            if let Line::Payload(payload) = classify(rest.trim_end_matches('\r')) {
                payloads.push(payload.to_string());
            }
        }
        self.finished = true;
        payloads
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.bytes[start..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    start = self.bytes.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    let prefix =
                        std::str::from_utf8(&self.bytes[start..valid_end]).unwrap_or_default();
                    self.text.push_str(prefix);
                    match err.error_len() {
                        Some(invalid) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + invalid;
                        }
                        // Incomplete sequence at the end: keep it for the next chunk.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.bytes.drain(..start);
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.text[consumed..].find('\n') {
            let end = consumed + offset;
            let line = self.text[consumed..end].trim_end_matches('\r');
            consumed = end + 1;
            let done = match classify(line) {
                Line::Payload(payload) => {
                    payloads.push(payload.to_string());
                    false
                }
                Line::Done => true,
                Line::Ignored => false,
            };
            if done {
                self.finished = true;
                self.text.clear();
                self.bytes.clear();
                return payloads;
            }
        }
        self.text.drain(..consumed);
        payloads
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: DataLineDecoder,
    ready: VecDeque<String>,
    exhausted: bool,
}

/// Turn a byte stream into a stream of `data: ` payloads.
pub fn data_events<S, B, E>(body: S) -> DataStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: DataLineDecoder::new(),
        ready: VecDeque::new(),
        exhausted: false,
    };
    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.ready.pop_front() {
                return Some((Ok(payload), state));
            }
            if state.exhausted || state.decoder.is_finished() {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.push(chunk.as_ref());
                    state.ready.extend(payloads);
                }
                Some(Err(err)) => {
                    state.exhausted = true;
                    return Some((Err(StreamError::Body(err.into())), state));
                }
                None => {
                    state.exhausted = true;
                    let payloads = state.decoder.finish();
                    state.ready.extend(payloads);
                }
            }
        }
    });
    Box::pin(events)
}
